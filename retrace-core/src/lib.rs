pub mod builder;
pub mod catalog;
pub mod completion;
pub mod config;
pub mod cookies;
pub mod error;
pub mod graph;
pub mod oracle;
pub mod plan;
pub mod report;
pub mod resolver;
pub mod session;

pub use builder::{AnalysisSummary, run_analysis};
pub use catalog::{CapturedRequest, CapturedResponse, RequestCatalog, RequestDescription};
pub use completion::{CompletionDiagnostics, CompletionSnapshot, CompletionState, analyze_completion};
pub use config::{AnalysisOptions, OracleSettings, RetraceConfig};
pub use cookies::{CookieEntry, CookieJar};
pub use error::{Error, Result};
pub use graph::{DependencyGraph, GraphSnapshot, Node, NodeAttrs, NodeContent, NodeId, NodeKind};
pub use oracle::{OracleAdapter, OracleError, StaticOracle};
pub use plan::{ReplayPlan, ReplayStep};
pub use resolver::{Dependency, DependencyResolver, Resolution};
pub use session::{AnalysisSession, SessionStore};

pub fn print_banner() {
    println!(
        r#"
              _
   _ __ ___  | |_  _ __   __ _   ___   ___
  | '__/ _ \ | __|| '__| / _` | / __| / _ \
  | | |  __/ | |_ | |   | (_| || (__ |  __/
  |_|  \___|  \__||_|    \__,_| \___| \___|

   rebuild replayable API call chains  v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
