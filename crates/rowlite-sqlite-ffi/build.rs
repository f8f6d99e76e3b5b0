use std::env;

fn main() {
	let bundled = env::var_os("CARGO_FEATURE_BUNDLED_SQLITE").is_some();

	match bundled {
		// libsqlite3-sys compiles and links the amalgamation
		true => {}
		false => link_system(),
	}
}

fn link_system() {
	let linked = pkg_config::Config::new()
		.atleast_version("3.38.0")
		.print_system_libs(false)
		.probe("sqlite3")
		.is_ok();

	if !linked {
		println!("cargo:rustc-link-lib=dylib=sqlite3");
	}
}
