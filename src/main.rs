use nosql_tomcat::{cli, runner};

fn main() -> anyhow::Result<()> {
    let parsed = cli::parse_cli();
    runner::run_from_cli(parsed)
}
