use anyhow::Result;

fn main() -> Result<()> {
    cordon::cli::run()
}
