//! CLI argument definitions using clap
//!
//! Commands:
//! - factline serve --config <path>
//! - factline recompute --tenant <id> --kind <kind> ...
//! - factline explain --tenant <id> --kind <kind> ...
//! - factline print-config --config <path>
//! - factline templates

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::http_server::fact_routes::EntityQuery;

/// factline - explainable facts for loan servicing
#[derive(Parser, Debug)]
#[command(name = "factline")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the HTTP API with the job worker and nightly schedule
    Serve {
        #[arg(long, default_value = "./factline.json")]
        config: PathBuf,

        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Recompute facts for one entity, run follow-up jobs, print the outcome
    Recompute {
        #[arg(long, default_value = "./factline.json")]
        config: PathBuf,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Compute facts for one entity and explain them
    Explain {
        #[arg(long, default_value = "./factline.json")]
        config: PathBuf,

        #[command(flatten)]
        target: TargetArgs,

        /// Audience; derived from roles when omitted
        #[arg(long)]
        audience: Option<String>,

        #[arg(long, value_enum, default_value_t = VerbosityArg::Standard)]
        verbosity: VerbosityArg,
    },

    /// Print the effective configuration
    PrintConfig {
        #[arg(long, default_value = "./factline.json")]
        config: PathBuf,
    },

    /// List registered prompt templates
    Templates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EntityKind {
    Loan,
    Covenant,
    Kpi,
    Portfolio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VerbosityArg {
    Short,
    Standard,
    Detailed,
}

/// Tenant, caller and entity of a one-shot command
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    #[arg(long)]
    pub tenant: String,

    #[arg(long)]
    pub actor: Option<String>,

    /// Comma-separated roles
    #[arg(long, value_delimiter = ',')]
    pub roles: Vec<String>,

    #[arg(long, value_enum)]
    pub kind: EntityKind,

    #[arg(long)]
    pub loan_id: Option<String>,

    #[arg(long)]
    pub covenant_id: Option<String>,

    #[arg(long)]
    pub kpi_id: Option<String>,

    /// Defaults to the tenant id
    #[arg(long)]
    pub portfolio_id: Option<String>,
}

impl TargetArgs {
    pub fn entity_query(&self) -> EntityQuery {
        let kind = match self.kind {
            EntityKind::Loan => "LOAN",
            EntityKind::Covenant => "COVENANT",
            EntityKind::Kpi => "KPI",
            EntityKind::Portfolio => "PORTFOLIO",
        };
        EntityQuery {
            kind: kind.to_string(),
            loan_id: self.loan_id.clone(),
            covenant_id: self.covenant_id.clone(),
            kpi_id: self.kpi_id.clone(),
            portfolio_id: self.portfolio_id.clone().or_else(|| Some(self.tenant.clone())),
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
