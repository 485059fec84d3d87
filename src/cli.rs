use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};
use std::ffi::OsString;
use std::time::Duration;

use crate::error::TailError;
use crate::pipeline::{FilterChain, FilterKind, FilterRule};
use crate::tail::TailConfig;

#[derive(Parser, Debug)]
#[command(name = "kubetail")]
#[command(about = "Tail logs from multiple Kubernetes pods simultaneously")]
#[command(long_about = "Tail logs from multiple Kubernetes pods simultaneously.

Every pod whose name contains one of the given names is tailed. Output is
followed until stopped with Ctrl-C or until every log stream closes.

Examples:
  kubetail -i apache nginx               Tail pods containing \"apache\" or \"nginx\" with a header per chunk
  kubetail pod1 pod2 --tail-lines 20     Start from the last 20 lines of each pod
  kubetail --in-cluster pod1             Use the pod's service account when running inside the cluster
  kubetail apache -w example.com,mysite.com -b POST

Include (-w) and exclude (-b) filters are applied in the order they are given.")]
pub struct Cli {
    /// Pod name substrings to match
    #[arg(value_name = "PODNAME", required = true)]
    pub names: Vec<String>,

    /// Use in-cluster configuration (when running inside a pod)
    #[arg(short = 'k', long = "in-cluster", visible_alias = "k8s")]
    pub in_cluster: bool,

    /// Display the pod name as a header along with the output
    #[arg(short = 'i', long = "id")]
    pub id: bool,

    /// Only display lines matching one of these patterns (comma separated, repeatable)
    #[arg(short = 'w', long, visible_alias = "white-list", value_delimiter = ',')]
    pub grep: Vec<String>,

    /// Exclude lines matching any of these patterns (comma separated, repeatable)
    #[arg(short = 'b', long, visible_alias = "black-list", value_delimiter = ',')]
    pub vgrep: Vec<String>,

    /// Start tail with this number of lines
    #[arg(short = 't', long, default_value_t = 10)]
    pub tail_lines: i64,

    /// Stop tailing every pod when one log stream fails
    #[arg(long)]
    pub fail_fast: bool,

    /// Maximum wait between buffer polls, in milliseconds
    #[arg(long, default_value_t = 500, hide = true)]
    pub poll_interval_ms: u64,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Parse arguments, keeping the raw matches so option order is available.
    pub fn try_parse_with_matches<I, T>(args: I) -> Result<(Self, ArgMatches), clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command().try_get_matches_from(args)?;
        let cli = Self::from_arg_matches(&matches)?;
        Ok((cli, matches))
    }

    pub fn tail_config(&self, matches: &ArgMatches, color: bool) -> Result<TailConfig, TailError> {
        Ok(TailConfig {
            names: self.names.clone(),
            filters: filter_chain(matches)?,
            headers: self.id,
            color,
            tail_lines: self.tail_lines,
            fail_fast: self.fail_fast,
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
        })
    }
}

/// Build the filter chain, ordering rules by where each option first
/// appeared on the command line. Options left without patterns add no rule.
pub fn filter_chain(matches: &ArgMatches) -> Result<FilterChain, TailError> {
    let mut rules = Vec::new();
    for (id, kind) in [("grep", FilterKind::Include), ("vgrep", FilterKind::Exclude)] {
        let Some(values) = matches.get_many::<String>(id) else {
            continue;
        };
        let patterns: Vec<String> = values.filter(|p| !p.is_empty()).cloned().collect();
        // An empty option such as `-w ""` disables that filter.
        if patterns.is_empty() {
            continue;
        }
        let position = matches.index_of(id).unwrap_or(usize::MAX);
        rules.push((position, FilterRule::new(kind, patterns)?));
    }
    rules.sort_by_key(|(position, _)| *position);
    Ok(FilterChain::new(
        rules.into_iter().map(|(_, rule)| rule).collect(),
    ))
}
