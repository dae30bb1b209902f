mod cli;
mod context;
mod output;

use anyhow::{Result, bail};
use clap::Parser;
use vdb::Response;

use crate::cli::{Cli, Command};
use crate::output::OutputFormat;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("vdb=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = cli.format;
    let engine = context::open_engine(&cli)?;

    let result = run(&engine, cli.command, format);
    finish(result, engine.close())
}

/// The command's own error wins over a failure to close afterwards.
fn finish(result: Result<()>, closed: vdb::Result<()>) -> Result<()> {
    match (result, closed) {
        (Err(e), Err(close_err)) => {
            eprintln!("warning: failed to close the database: {close_err}");
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(()), closed) => Ok(closed?),
    }
}

fn run(engine: &vdb::Engine, command: Command, format: OutputFormat) -> Result<()> {
    match command {
        Command::CreateTable(cmd) => {
            let options = context::table_options(&cmd)?;
            let meta = engine.create_table(&cmd.name, options)?;
            output::print_meta(&meta, format);
        }
        Command::DropTable { name } => {
            if engine.drop_table(&name)? {
                println!("Table '{name}' dropped.");
            } else {
                println!("Table '{name}' does not exist.");
            }
        }
        Command::Tables => output::print_tables(&engine.tables()?, format),
        Command::Stats { table } => output::print_stats(&engine.table_stats(&table)?, format),
        Command::Insert(cmd) => {
            let payload = cmd.payload.map(String::into_bytes);
            let id = engine.insert(&cmd.table, cmd.vector.0, payload)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::json!({ "id": id })),
                OutputFormat::Table => println!("Inserted record {id} into '{}'.", cmd.table),
            }
        }
        Command::Get { table, id } => output::print_record(&engine.get(&table, id)?, format),
        Command::Delete { table, id } => {
            if engine.delete(&table, id)? {
                println!("Record {id} deleted.");
            } else {
                println!("Record {id} does not exist.");
            }
        }
        Command::Knn(cmd) => {
            print_response(engine.knn(&cmd.table, &cmd.vector.0, cmd.limit), format)?;
        }
        Command::KnnById { table, id, limit } => {
            print_response(engine.knn_by_id(&table, id, limit), format)?;
        }
        Command::Rebuild { table } => {
            engine.rebuild_index(&table)?;
            println!("Index of '{table}' rebuilt.");
        }
    }
    Ok(())
}

fn print_response(response: Response, format: OutputFormat) -> Result<()> {
    let (code, results) = (response.code, response.results);
    if !code.is_ok() {
        bail!("query failed with code {} ({})", code.as_i32(), code.name());
    }
    output::print_results(&results, format);
    Ok(())
}
