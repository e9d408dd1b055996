mod cli;

fn main() -> anyhow::Result<()> {
    camtouch::logging::init();
    cli::run()
}
