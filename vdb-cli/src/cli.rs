use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use vdb::{DistanceMetric, RecordId};

use crate::output::OutputFormat;

/// vdb - persistent vector store CLI
#[derive(Parser)]
#[command(name = "vdb", version, about)]
pub struct Cli {
    /// Root directory of the database.
    #[arg(long, env = "VDB_ROOT", default_value = "./vdb_data")]
    pub root: PathBuf,

    /// Engine configuration TOML file.
    #[arg(long, env = "VDB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a table.
    CreateTable(CreateTableCommand),
    /// Drop a table and its files.
    DropTable {
        name: String,
    },
    /// List tables.
    Tables,
    /// Show table statistics.
    Stats {
        table: String,
    },
    /// Insert a vector.
    Insert(InsertCommand),
    /// Get a record by id.
    Get {
        table: String,
        id: RecordId,
    },
    /// Delete a record by id.
    Delete {
        table: String,
        id: RecordId,
    },
    /// Nearest neighbors of a vector.
    Knn(KnnCommand),
    /// Nearest neighbors of a stored record.
    KnnById {
        table: String,
        id: RecordId,
        /// Maximum number of results.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Rebuild a table's index from its records.
    Rebuild {
        table: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum IndexArg {
    Flat,
    Ivf,
}

#[derive(Args)]
pub struct CreateTableCommand {
    pub name: String,

    /// Table options TOML file. Flags override its values.
    #[arg(long)]
    pub options: Option<PathBuf>,

    /// Fix the dimension up front instead of on first insert.
    #[arg(long)]
    pub dimension: Option<usize>,

    /// euclidean, cosine or inner_product.
    #[arg(long)]
    pub metric: Option<DistanceMetric>,

    #[arg(long, value_enum)]
    pub index: Option<IndexArg>,

    /// IVF list count.
    #[arg(long)]
    pub n_lists: Option<usize>,

    /// IVF lists probed per query.
    #[arg(long)]
    pub n_probe: Option<usize>,

    /// L2-normalize vectors on insert and query.
    #[arg(long)]
    pub normalize: bool,
}

#[derive(Args)]
pub struct InsertCommand {
    pub table: String,

    /// Vector as `1.0,2.0,3.0` or a JSON array.
    #[arg(long, value_parser = parse_vector, allow_hyphen_values = true)]
    pub vector: VectorArg,

    /// UTF-8 payload stored with the vector.
    #[arg(long)]
    pub payload: Option<String>,
}

#[derive(Args)]
pub struct KnnCommand {
    pub table: String,

    /// Query vector as `1.0,2.0,3.0` or a JSON array.
    #[arg(long, value_parser = parse_vector, allow_hyphen_values = true)]
    pub vector: VectorArg,

    /// Maximum number of results.
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

/// A vector given on the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorArg(pub Vec<f32>);

fn parse_vector(s: &str) -> Result<VectorArg, String> {
    let s = s.trim();
    if s.starts_with('[') {
        return serde_json::from_str(s)
            .map(VectorArg)
            .map_err(|e| format!("invalid JSON vector: {e}"));
    }
    s.split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(|e| format!("invalid component '{}': {e}", part.trim()))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(VectorArg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vector() {
        assert_eq!(parse_vector("1, -2.5,3").unwrap().0, vec![1.0, -2.5, 3.0]);
        assert_eq!(parse_vector("[0.5, 1]").unwrap().0, vec![0.5, 1.0]);
        assert!(parse_vector("1,x").is_err());
        assert!(parse_vector("[1,").is_err());
    }

    #[test]
    fn test_cli_parses_knn() {
        let cli = Cli::try_parse_from([
            "vdb", "--root", "/tmp/db", "knn", "t", "--vector", "-1,0", "--limit", "3",
        ])
        .unwrap();
        match cli.command {
            Command::Knn(cmd) => {
                assert_eq!(cmd.table, "t");
                assert_eq!(cmd.vector.0, vec![-1.0, 0.0]);
                assert_eq!(cmd.limit, 3);
            }
            _ => panic!("expected knn"),
        }
    }
}
