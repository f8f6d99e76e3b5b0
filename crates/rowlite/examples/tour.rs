use rowlite::batch::from_iter;
use rowlite::{Connection, Param, Value, params};

fn main() -> Result<(), Box<dyn std::error::Error>> {
	let db = Connection::open_in_memory()?;
	db.execute("create table inventory(sku text primary key, qty integer not null)", &[])?;

	let tx = db.transaction()?;
	let stock = [("A100", 8_i64), ("B205", 14), ("C330", 3)];
	let changes = tx.batch_execute(
		"insert into inventory(sku, qty) values (?, ?)",
		from_iter(stock.map(|(sku, qty)| Param::list(params![sku, qty]))),
	)?;
	tx.commit()?;
	println!("inserted {changes} rows");

	for row in db.query_array("select sku, qty from inventory order by sku", &[])?.unwrap_or_default() {
		match row.as_slice() {
			[Value::Text(sku), Value::Integer(qty)] => {
				println!("{sku}: {qty}");
			}
			_ => return Err("unexpected row shape".into()),
		}
	}

	Ok(())
}
