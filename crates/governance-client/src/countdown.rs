//! Remaining voting time and window classification

use crate::proposal::Proposal;
use std::fmt;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Current unix time in seconds.
pub fn now_unix() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Time left until a proposal's `end_time`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Countdown {
    Remaining {
        days: u64,
        hours: u64,
        minutes: u64,
        seconds: u64,
    },
    Ended,
}

impl Countdown {
    pub fn until(end_time: u64, now: u64) -> Self {
        if end_time <= now {
            return Countdown::Ended;
        }

        let diff = end_time - now;
        Countdown::Remaining {
            days: diff / DAY,
            hours: (diff % DAY) / HOUR,
            minutes: (diff % HOUR) / MINUTE,
            seconds: diff % MINUTE,
        }
    }

    pub fn for_proposal(proposal: &Proposal, now: u64) -> Self {
        Self::until(proposal.end_time, now)
    }

    pub fn is_ended(&self) -> bool {
        matches!(self, Countdown::Ended)
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Countdown::Ended => f.write_str("Voting Ended"),
            Countdown::Remaining {
                days,
                hours,
                minutes,
                seconds,
            } => {
                if days > 0 {
                    write!(f, "{days}d ")?;
                }
                write!(f, "{hours}h {minutes}m {seconds}s")
            }
        }
    }
}

/// Where a proposal sits relative to its voting window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VotingWindow {
    Upcoming,
    Open,
    Ended,
    Executed,
}

impl VotingWindow {
    pub fn classify(proposal: &Proposal, now: u64) -> Self {
        if proposal.executed {
            VotingWindow::Executed
        } else if now < proposal.start_time {
            VotingWindow::Upcoming
        } else if proposal.is_open_at(now) {
            VotingWindow::Open
        } else {
            VotingWindow::Ended
        }
    }
}

impl fmt::Display for VotingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            VotingWindow::Upcoming => "upcoming",
            VotingWindow::Open => "open",
            VotingWindow::Ended => "ended",
            VotingWindow::Executed => "executed",
        };
        f.write_str(label)
    }
}
