mod command;
mod export;
mod load;
mod util;

fn main() -> anyhow::Result<()> {
    command::run()
}
