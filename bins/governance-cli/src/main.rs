//! Governance CLI
//!
//! Lists, watches and searches network-state proposals through the indexer,
//! and votes, creates or executes proposals through a JSON-RPC node.

use anyhow::{anyhow, Context, Result};
use chain_rpc::{ChainConfig, ChainRpcClient, DEFAULT_CONTRACT_ADDRESS, DEFAULT_RPC_URL};
use chrono::{DateTime, NaiveDateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use governance_client::{
    now_unix, parse_hex_bytes, ChainCollaborators, ComposerConfig, Countdown, FetcherConfig,
    GovernanceClient, GovernanceConfig, Notification, Notifier, Proposal, ProposalDraft,
    ProposalView, Severity, VoteConfig, VoteDirection, VotingWindow, DEFAULT_CANDIDATE_COUNT,
    DEFAULT_INDEXER_URL,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

// ==================== Notifications ====================

/// Routes client notifications to the log.
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notification: Notification) {
        match notification.severity {
            Severity::Info => info!("{}: {}", notification.title, notification.description),
            Severity::Destructive => {
                error!("{}: {}", notification.title, notification.description)
            }
        }
    }
}

// ==================== CLI ====================

#[derive(Parser, Debug)]
#[command(name = "governance-cli")]
#[command(about = "Network-state governance proposals and voting")]
struct Args {
    /// GraphQL indexer endpoint
    #[arg(long, env = "GOVERNANCE_INDEXER_URL", default_value = DEFAULT_INDEXER_URL)]
    indexer_url: String,

    /// JSON-RPC endpoint of the signing node
    #[arg(long, env = "GOVERNANCE_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,

    /// Governance contract address
    #[arg(long, env = "GOVERNANCE_CONTRACT", default_value = DEFAULT_CONTRACT_ADDRESS)]
    contract: String,

    /// Sending account (defaults to the node's first account)
    #[arg(long, env = "GOVERNANCE_ACCOUNT")]
    account: Option<String>,

    /// Candidate proposal ids queried per fetch
    #[arg(long, default_value_t = DEFAULT_CANDIDATE_COUNT)]
    candidates: u64,

    /// Seconds between refreshes in `watch`
    #[arg(long, default_value = "30")]
    poll_interval: u64,

    /// Confirmations awaited for a vote
    #[arg(long, default_value = "1")]
    confirmations: u64,

    /// Seconds to wait for confirmation, 0 waits forever
    #[arg(long, default_value = "300")]
    confirmation_timeout: u64,

    /// Hook data attached to votes, hex
    #[arg(long, default_value = "0x12")]
    hook_data: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch and print proposals
    List {
        /// Case-insensitive filter on the proposal URI
        #[arg(short, long, default_value = "")]
        search: String,
    },
    /// Keep polling and print the proposal list on every change
    Watch {
        #[arg(short, long, default_value = "")]
        search: String,
    },
    /// Print one proposal as JSON
    Show { id: u64 },
    /// Print an indexer activity feed
    Feed {
        #[arg(value_enum)]
        kind: FeedKind,
        #[arg(long, default_value = "10")]
        first: usize,
    },
    /// Vote on a proposal (`for` or `against`)
    Vote { id: u64, direction: VoteDirection },
    /// Create a proposal
    Create {
        #[arg(long)]
        uri: String,
        /// Unix seconds, RFC 3339, or `YYYY-MM-DDTHH:MM` (UTC)
        #[arg(long)]
        start: String,
        /// Voting period in days
        #[arg(long)]
        days: u64,
    },
    /// Execute a passed proposal
    Execute { id: u64 },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FeedKind {
    Latest,
    Executed,
    Votes,
}

impl Args {
    fn governance_config(&self) -> Result<GovernanceConfig> {
        let hook_data = parse_hex_bytes(&self.hook_data)
            .with_context(|| format!("invalid hook data {:?}", self.hook_data))?;
        let confirmation_timeout =
            (self.confirmation_timeout > 0).then(|| Duration::from_secs(self.confirmation_timeout));

        Ok(GovernanceConfig {
            indexer_url: self.indexer_url.clone(),
            fetcher: FetcherConfig {
                candidate_count: self.candidates,
                poll_interval: Duration::from_secs(self.poll_interval.max(1)),
                ..FetcherConfig::default()
            },
            votes: VoteConfig {
                confirmations: self.confirmations.max(1),
                confirmation_timeout,
                hook_data,
            },
            proposals: ComposerConfig {
                confirmations: self.confirmations.max(1),
                confirmation_timeout,
                ..ComposerConfig::default()
            },
            ..GovernanceConfig::default()
        })
    }

    fn chain_config(&self) -> ChainConfig {
        ChainConfig {
            rpc_url: self.rpc_url.clone(),
            contract: self.contract.clone(),
            account: self.account.clone(),
            ..ChainConfig::default()
        }
    }
}

/// Parse a proposal start time into unix seconds.
fn parse_start_time(value: &str) -> Result<u64> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Ok(seconds);
    }
    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return u64::try_from(time.timestamp()).map_err(|_| anyhow!("start time before 1970"));
    }
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M")
        .with_context(|| format!("unrecognized start time {value:?}"))?;
    u64::try_from(naive.and_utc().timestamp()).map_err(|_| anyhow!("start time before 1970"))
}

fn format_timestamp(seconds: u64) -> String {
    i64::try_from(seconds)
        .ok()
        .and_then(|s| DateTime::<Utc>::from_timestamp(s, 0))
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| seconds.to_string())
}

fn proposal_row(proposal: &Proposal, now: u64) -> String {
    format!(
        "#{:<4} [{}] {:<9} for {:<6} against {:<6} {:<18} ends {}  {}",
        proposal.id,
        proposal.proposer_badge(),
        VotingWindow::classify(proposal, now).to_string(),
        proposal.for_score,
        proposal.against_score,
        Countdown::for_proposal(proposal, now).to_string(),
        format_timestamp(proposal.end_time),
        proposal.uri,
    )
}

fn print_proposals(proposals: &[Proposal]) {
    if proposals.is_empty() {
        println!("No proposals found");
        return;
    }
    let now = now_unix();
    for proposal in proposals {
        println!("{}", proposal_row(proposal, now));
    }
}

// ==================== Main ====================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,governance_cli=debug".into()),
        )
        .init();

    let args = Args::parse();
    let config = args.governance_config()?;

    let chain = Arc::new(ChainRpcClient::new(args.chain_config())?);
    let collaborators = ChainCollaborators {
        contract: chain.clone(),
        watcher: chain.clone(),
        session: chain.clone(),
        notifier: Arc::new(ConsoleNotifier),
    };
    let client = GovernanceClient::new(config, collaborators)?;

    match args.command {
        Command::List { search } => {
            let proposals = client.refresh().await?;
            let mut view = ProposalView::new(search);
            print_proposals(view.filtered(&proposals));
        }

        Command::Watch { search } => {
            info!(
                indexer = %args.indexer_url,
                interval_secs = args.poll_interval,
                "Watching proposals (Ctrl+C to stop)"
            );
            let poller = client.start();
            let mut view = ProposalView::new(search);
            let mut seen_generation = 0;
            let mut ticker = tokio::time::interval(Duration::from_secs(1));

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let store = client.store();
                        let generation = store.generation();
                        if generation != seen_generation {
                            seen_generation = generation;
                            println!("--- {} ---", Utc::now().format("%H:%M:%S"));
                            print_proposals(view.filtered(&store.snapshot()));
                        }
                        if let Some(e) = store.last_error() {
                            warn!(error = %e, "Showing cached proposals");
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("Stopping");
                        break;
                    }
                }
            }
            poller.abort();
        }

        Command::Show { id } => {
            client.refresh().await?;
            let proposal = client
                .store()
                .get(id)
                .ok_or_else(|| anyhow!("proposal {id} not found"))?;
            println!("{}", serde_json::to_string_pretty(&proposal)?);
            println!(
                "window: {}, {}",
                VotingWindow::classify(&proposal, now_unix()),
                Countdown::for_proposal(&proposal, now_unix())
            );
        }

        Command::Feed { kind, first } => {
            let indexer = client.indexer();
            match kind {
                FeedKind::Latest => print_proposals(&indexer.latest_proposals(first).await?),
                FeedKind::Executed => {
                    for executed in indexer.executed_proposals(first).await? {
                        println!("#{} executed={}", executed.id, executed.executed);
                    }
                }
                FeedKind::Votes => {
                    for vote in indexer.recent_votes(first).await? {
                        println!(
                            "#{} {} weight {}",
                            vote.proposal_id, vote.voter_id, vote.weight
                        );
                    }
                }
            }
        }

        Command::Vote { id, direction } => {
            // Populate the cache so closed proposals are refused locally.
            if let Err(e) = client.refresh().await {
                warn!(error = %e, "Voting without a proposal snapshot");
            }
            let tx = client.votes().submit_vote(id, direction).await?;
            println!("{tx}");
        }

        Command::Create { uri, start, days } => {
            let draft = ProposalDraft {
                uri,
                start_time: parse_start_time(&start)?,
                voting_period_days: days,
            };
            let tx = client.composer().create_proposal(draft).await?;
            println!("{tx}");
        }

        Command::Execute { id } => {
            let tx = client.composer().execute_proposal(id).await?;
            println!("{tx}");
        }
    }

    Ok(())
}
