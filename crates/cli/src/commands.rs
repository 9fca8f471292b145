use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Create the source CDC objects, then propagate table schemas and
    /// bootstrap the target metadata tables.
    #[command(name = "setup")]
    Setup,

    /// Run one CDC cycle over every table in scope.
    #[command(name = "sync_data")]
    SyncData,

    /// Write the SQL an operator must run on the source before setup.
    #[command(name = "generate_source_sql")]
    GenerateSourceSql {
        #[arg(long, default_value = "output", help = "Directory for source_setup.sql")]
        output: String,
    },
}
