use tidecast_rt::Runtime;

fn main() -> anyhow::Result<()> {
    let root = std::env::args().nth(1).unwrap_or_else(|| ".".into());
    Runtime::new(root).run()
}
