pub mod crawl;
pub mod output;

const BANNER: &str = r#"
   ___ _ __   __ _ _ __ ___
  / __| '_ \ / _` | '__/ _ \
  \__ \ | | | (_| | | |  __/
  |___/_| |_|\__,_|_|  \___|
"#;

pub fn print_banner() {
    println!("{}", BANNER);
    println!(
        "  v{} - crawl sites for phishing evidence\n",
        env!("CARGO_PKG_VERSION")
    );
}
