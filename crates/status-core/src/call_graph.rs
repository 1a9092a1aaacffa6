//! Grouping of channel events into calls
//!
//! A `Status` burst lists every live channel. Channels sharing a `Linkedid`
//! belong to the same call; the one whose `Uniqueid` equals the `Linkedid`
//! is the primary (originating) leg, the others are bridged or transferred
//! legs. [`build_snapshot`] turns one burst into a [`StatusSnapshot`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::event::ChannelEvent;
use crate::resolver::CallerIdResolver;

/// Summary text when no call is up.
pub const IDLE_STATUS: &str = "idle";

/// One logical call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub caller_id_from: String,
    pub callee_to: String,
    pub raw_from: String,
    pub raw_to: String,
    /// `"name(state)"` per leg, primary first
    pub legs: Vec<String>,
    /// Display name of the primary leg's channel
    pub channel: String,
    pub context: String,
}

impl CallRecord {
    /// `"from->to [leg,leg]"`
    pub fn summary(&self) -> String {
        format!("{}->{} [{}]", self.caller_id_from, self.callee_to, self.legs.join(","))
    }
}

/// Aggregate view published after every collection cycle.
///
/// The vectors are parallel: index `i` of each describes call `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    #[serde(rename = "status")]
    pub summary_text: String,
    pub calls_from: Vec<String>,
    pub calls_to: Vec<String>,
    pub cids_from: Vec<String>,
    pub cids_to: Vec<String>,
    pub channels: Vec<String>,
    pub contexts: Vec<String>,
}

impl StatusSnapshot {
    pub fn idle() -> Self {
        Self::from_calls(&[])
    }

    pub fn from_calls(calls: &[CallRecord]) -> Self {
        let summary_text = if calls.is_empty() {
            IDLE_STATUS.to_string()
        } else {
            calls
                .iter()
                .map(CallRecord::summary)
                .collect::<Vec<_>>()
                .join(", ")
        };

        Self {
            summary_text,
            calls_from: calls.iter().map(|c| c.raw_from.clone()).collect(),
            calls_to: calls.iter().map(|c| c.raw_to.clone()).collect(),
            cids_from: calls.iter().map(|c| c.caller_id_from.clone()).collect(),
            cids_to: calls.iter().map(|c| c.callee_to.clone()).collect(),
            channels: calls.iter().map(|c| c.channel.clone()).collect(),
            contexts: calls.iter().map(|c| c.context.clone()).collect(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls_from.len()
    }

    pub fn is_idle(&self) -> bool {
        self.call_count() == 0
    }
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self::idle()
    }
}

/// Group channels into calls, in primary arrival order.
///
/// Names reported on the channels themselves are fed to the resolver's
/// cache first, so a caller announcing its own name shows up in this very
/// snapshot without a lookup round-trip.
pub fn build_calls(events: &[ChannelEvent], resolver: &mut CallerIdResolver) -> Vec<CallRecord> {
    for event in events {
        if let Some(name) = event.known_caller_name() {
            resolver.learn(&event.caller_id_number, name);
        }
    }

    let (primaries, secondaries): (Vec<&ChannelEvent>, Vec<&ChannelEvent>) =
        events.iter().partition(|e| e.is_primary());

    let mut calls = Vec::with_capacity(primaries.len());
    let mut grouped = 0;

    for primary in primaries {
        let mut legs = vec![primary.leg_description()];
        for leg in secondaries.iter().filter(|e| e.linked_id == primary.unique_id) {
            legs.push(leg.leg_description());
            grouped += 1;
        }

        calls.push(CallRecord {
            caller_id_from: resolver.resolve(&primary.caller_id_number),
            callee_to: resolver.resolve(&primary.extension),
            raw_from: primary.caller_id_number.clone(),
            raw_to: primary.extension.clone(),
            legs,
            channel: primary.display_channel_name.clone(),
            context: primary.context.clone(),
        });
    }

    if grouped < secondaries.len() {
        debug!(
            "Dropped {} channel(s) whose call has no primary leg",
            secondaries.len() - grouped
        );
    }

    calls
}

/// Build the snapshot for one completed collection cycle.
pub fn build_snapshot(events: &[ChannelEvent], resolver: &mut CallerIdResolver) -> StatusSnapshot {
    StatusSnapshot::from_calls(&build_calls(events, resolver))
}
