#[tokio::main]
async fn main() {
    if let Err(e) = docintake::run().await {
        eprintln!("docintake: {e}");
        std::process::exit(1);
    }
}
