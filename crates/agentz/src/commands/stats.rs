//! Aggregate read endpoints.

use clap::{Args, ValueEnum};

use agentz_core::Services;
use agentz_store::aggregates;

use super::{CommandResult, print_json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatsView {
    /// Session counts and token totals.
    Overview,
    /// Tool-call counts by name and class.
    Tools,
    /// Most-edited files across terminal sessions.
    HotFiles,
    /// Every file change with its owning session.
    Files,
    /// Per-agent session statistics.
    Sessions,
    /// Session counts per owning task.
    Tasks,
    /// Individual tool invocations.
    ToolCalls,
    /// Sessions started per local-timezone day.
    Daily,
}

#[derive(Debug, Args)]
pub struct StatsArgs {
    #[arg(value_enum, default_value_t = StatsView::Overview)]
    pub view: StatsView,

    /// Row cap for ranked views.
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

pub fn run(services: &Services, args: StatsArgs) -> CommandResult {
    let store = &services.store;
    match args.view {
        StatsView::Overview => print_json(&aggregates::overview(store)?),
        StatsView::Tools => print_json(&aggregates::tool_stats(store)?),
        StatsView::HotFiles => print_json(&aggregates::hot_files(store, args.limit)?),
        StatsView::Files => print_json(&aggregates::file_changes(store)?),
        StatsView::Sessions => print_json(&aggregates::session_stats(store)?),
        StatsView::Tasks => print_json(&aggregates::task_metrics(store)?),
        StatsView::ToolCalls => print_json(&aggregates::tool_call_details(store)?),
        StatsView::Daily => print_json(&aggregates::daily_buckets(store)?),
    }
}
