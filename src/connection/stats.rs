//! Statistics flattening

use super::state::ConnectionStats;
use crate::platform::{CandidatePairState, StatsEntry};

/// Flatten a platform report into [`ConnectionStats`].
///
/// Byte, loss and jitter counters are summed over every outbound/inbound
/// entry. Round-trip time and bandwidth come from the most recent succeeded
/// candidate pair; other pairs are ignored.
pub fn summarize(report: &[StatsEntry]) -> ConnectionStats {
    let mut stats = ConnectionStats::default();
    let mut latest_pair: Option<f64> = None;

    for entry in report {
        match entry {
            StatsEntry::OutboundRtp { bytes_sent, .. } => {
                stats.bytes_sent += bytes_sent;
            }
            StatsEntry::InboundRtp {
                bytes_received,
                packets_lost,
                jitter,
                ..
            } => {
                stats.bytes_received += bytes_received;
                stats.packets_lost += packets_lost;
                stats.jitter += jitter;
            }
            StatsEntry::CandidatePair {
                state: CandidatePairState::Succeeded,
                timestamp,
                current_round_trip_time,
                available_outgoing_bitrate,
                ..
            } => {
                if latest_pair.map_or(true, |seen| *timestamp >= seen) {
                    latest_pair = Some(*timestamp);
                    stats.round_trip_time = current_round_trip_time.unwrap_or(0.0);
                    stats.available_bandwidth = available_outgoing_bitrate.unwrap_or(0.0);
                }
            }
            _ => {}
        }
    }

    stats
}
