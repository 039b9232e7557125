//! Line classifier: raw harvester/farmer log line → one typed outcome.
//!
//! Matching is ordered and exclusive. A line is tried as a farming-cycle
//! (proof) line first; only when that fails are the side-channel markers
//! tested, in order: pool info response, farmer response, points, proof fee.

#![allow(missing_docs)]

use chrono::NaiveDateTime;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::core::errors::{ClmError, Result};
use crate::model::{
    ClassifiedOutcome, FarmerInfo, FeeInfo, PayloadKind, PoolInfo, ProofEvent,
    UnrecognizedReason,
};
use crate::parse::literal::parse_literal_object;

/// Timestamp layout printed by the Chia logger (`2024-05-01T12:00:00.123`).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

// Newer releases print the node version between the timestamp and the
// service name, e.g. `2024-05-01T12:00:00.123 2.3.0 harvester ...`.
const PROOF_PATTERN: &str = concat!(
    r"^(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{3})(?: \S+)? harvester ",
    r"chia\.harvester\.harvester: INFO\s+(\d+) plots were eligible for farming \w+\.\.\. ",
    r"Found (\d+) proofs\. Time: (\d+(?:\.\d+)?) s\. Total (\d+) plots"
);
const POOL_INFO_PATTERN: &str = r"GET /pool_info response:\s+(\{.*\})";
const FARMER_PATTERN: &str = r"GET /farmer response:\s+(\{.*\})";
const POINTS_PATTERN: &str = r"Points: (\d+)";
const FEE_RATE_PATTERN: &str = r"fee_rate = (\d+(?:\.\d+)?) %";
const USED_GPU_PATTERN: &str = r"used_gpu = (True|False|true|false)";
const FOUND_PROOF_MARKER: &str = "Found proof";

/// Compiled patterns for every recognized line kind. Cheap to share by reference.
#[derive(Debug, Clone)]
pub struct LineClassifier {
    proof: Regex,
    pool_info: Regex,
    farmer: Regex,
    points: Regex,
    fee_rate: Regex,
    used_gpu: Regex,
}

impl LineClassifier {
    pub fn new() -> Result<Self> {
        Ok(Self {
            proof: compile("proof", PROOF_PATTERN)?,
            pool_info: compile("pool_info", POOL_INFO_PATTERN)?,
            farmer: compile("farmer", FARMER_PATTERN)?,
            points: compile("points", POINTS_PATTERN)?,
            fee_rate: compile("fee_rate", FEE_RATE_PATTERN)?,
            used_gpu: compile("used_gpu", USED_GPU_PATTERN)?,
        })
    }

    /// Classify one line. Never fails: anything that cannot be decoded is
    /// [`ClassifiedOutcome::Unrecognized`].
    #[must_use]
    pub fn classify(&self, line: &str) -> ClassifiedOutcome {
        if let Some(event) = self.proof_event(line) {
            return ClassifiedOutcome::ProofEvent(event);
        }

        if let Some(caps) = self.pool_info.captures(line) {
            return payload_object(&caps[1])
                .and_then(pool_info_from)
                .map_or(
                    ClassifiedOutcome::Unrecognized(UnrecognizedReason::MalformedPayload(
                        PayloadKind::PoolInfo,
                    )),
                    ClassifiedOutcome::PoolInfoUpdate,
                );
        }

        if let Some(caps) = self.farmer.captures(line) {
            return payload_object(&caps[1])
                .and_then(farmer_info_from)
                .map_or(
                    ClassifiedOutcome::Unrecognized(UnrecognizedReason::MalformedPayload(
                        PayloadKind::Farmer,
                    )),
                    ClassifiedOutcome::FarmerInfoUpdate,
                );
        }

        if let Some(points) = self
            .points
            .captures(line)
            .and_then(|caps| caps[1].parse::<u64>().ok())
        {
            return ClassifiedOutcome::PointsUpdate(points);
        }

        if let Some(fee) = self.fee_info(line) {
            return ClassifiedOutcome::FeeCandidateLine(fee);
        }

        ClassifiedOutcome::Unrecognized(UnrecognizedReason::NoMatch)
    }

    fn proof_event(&self, line: &str) -> Option<ProofEvent> {
        let caps = self.proof.captures(line)?;
        Some(ProofEvent {
            timestamp: NaiveDateTime::parse_from_str(&caps[1], TIMESTAMP_FORMAT).ok()?,
            eligible_plots: caps[2].parse().ok()?,
            proofs_found: caps[3].parse().ok()?,
            time_taken_secs: caps[4].parse().ok()?,
            total_plots: caps[5].parse().ok()?,
        })
    }

    fn fee_info(&self, line: &str) -> Option<FeeInfo> {
        if !line.contains(FOUND_PROOF_MARKER) {
            return None;
        }
        let fee_rate_percent = self.fee_rate.captures(line)?[1].parse().ok()?;
        let gpu_used = self
            .used_gpu
            .captures(line)
            .is_some_and(|caps| caps[1].eq_ignore_ascii_case("true"));
        Some(FeeInfo {
            gpu_used,
            fee_rate_percent,
        })
    }
}

fn compile(name: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|err| ClmError::Runtime {
        details: format!("built-in {name} pattern failed to compile: {err}"),
    })
}

fn payload_object(raw: &str) -> Option<Map<String, Value>> {
    parse_literal_object(raw).ok()
}

/// Numbers sometimes arrive quoted (`'fee': '0.01'`).
#[derive(Deserialize)]
#[serde(untagged)]
enum LooseNumber {
    Number(f64),
    Text(String),
}

impl LooseNumber {
    fn value(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Deserialize)]
struct PoolInfoPayload {
    name: String,
    #[serde(default)]
    description: Option<String>,
    fee: LooseNumber,
}

#[derive(Deserialize)]
struct FarmerPayload {
    current_difficulty: LooseNumber,
    current_points: u64,
}

fn pool_info_from(map: Map<String, Value>) -> Option<PoolInfo> {
    let payload: PoolInfoPayload = serde_json::from_value(Value::Object(map)).ok()?;
    Some(PoolInfo {
        discord_handle: payload
            .description
            .as_deref()
            .map(discord_handle)
            .unwrap_or_default(),
        fee_percent: payload.fee.value()?,
        name: payload.name,
    })
}

fn farmer_info_from(map: Map<String, Value>) -> Option<FarmerInfo> {
    let payload: FarmerPayload = serde_json::from_value(Value::Object(map)).ok()?;
    Some(FarmerInfo {
        current_difficulty: payload.current_difficulty.value()?,
        current_points: payload.current_points,
    })
}

/// Pools advertise their Discord contact as the last word of the description,
/// usually parenthesized: `"Best pool around (@bestpool)"` → `@bestpool`.
fn discord_handle(description: &str) -> String {
    description
        .split(' ')
        .next_back()
        .unwrap_or_default()
        .trim_matches(|c| c == '(' || c == ')')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn classifier() -> LineClassifier {
        LineClassifier::new().expect("built-in patterns compile")
    }

    fn proof_line(eligible: u64, proofs: u64, time: &str, total: u64) -> String {
        format!(
            "2024-05-01T12:34:56.789 harvester chia.harvester.harvester: INFO     \
             {eligible} plots were eligible for farming 8f3a1c2b9d... Found {proofs} proofs. \
             Time: {time} s. Total {total} plots"
        )
    }

    #[test]
    fn classifies_proof_line_fields() {
        let outcome = classifier().classify(&proof_line(3, 1, "0.53125", 412));
        let ClassifiedOutcome::ProofEvent(event) = outcome else {
            panic!("expected proof event, got {outcome:?}");
        };
        assert_eq!(
            event.timestamp,
            NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_milli_opt(12, 34, 56, 789)
                .unwrap()
        );
        assert_eq!(event.eligible_plots, 3);
        assert_eq!(event.proofs_found, 1);
        assert!((event.time_taken_secs - 0.53125).abs() < f64::EPSILON);
        assert_eq!(event.total_plots, 412);
    }

    #[test]
    fn accepts_version_token_before_service_name() {
        let line = "2024-05-01T12:34:56.789 2.3.0 harvester chia.harvester.harvester: INFO \
                    0 plots were eligible for farming abcdef0123... Found 0 proofs. \
                    Time: 0.01200 s. Total 88 plots";
        assert!(matches!(
            classifier().classify(line),
            ClassifiedOutcome::ProofEvent(ProofEvent { total_plots: 88, .. })
        ));
    }

    #[test]
    fn proof_pattern_is_anchored_at_line_start() {
        let line = format!("garbage {}", proof_line(1, 0, "1.0", 10));
        assert!(classifier().classify(&line).is_unrecognized());
    }

    #[test]
    fn malformed_time_is_unrecognized() {
        let line = proof_line(1, 0, "1.2.3", 10);
        assert!(classifier().classify(&line).is_unrecognized());
    }

    #[test]
    fn classifies_pool_info_response() {
        let line = "2024-05-01T12:00:00.000 farmer farmer_server: INFO GET /pool_info response: \
                    {'description': 'The friendliest pool (@friendlypool)', 'fee': 0.01, \
                    'name': 'Friendly Pool', 'protocol_version': 1}";
        let ClassifiedOutcome::PoolInfoUpdate(info) = classifier().classify(line) else {
            panic!("expected pool info");
        };
        assert_eq!(info.name, "Friendly Pool");
        assert_eq!(info.discord_handle, "@friendlypool");
        assert!((info.fee_percent - 0.01).abs() < f64::EPSILON);
    }

    #[test]
    fn pool_info_accepts_quoted_fee_and_missing_description() {
        let line = "GET /pool_info response: {'fee': '1.5', 'name': 'P'}";
        let ClassifiedOutcome::PoolInfoUpdate(info) = classifier().classify(line) else {
            panic!("expected pool info");
        };
        assert_eq!(info.discord_handle, "");
        assert!((info.fee_percent - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn classifies_farmer_response() {
        let line = "farmer: INFO GET /farmer response: {'authentication_public_key': '0xaa', \
                    'current_difficulty': 4, 'current_points': 1820, 'payout_instructions': 'xch1'}";
        assert_eq!(
            classifier().classify(line),
            ClassifiedOutcome::FarmerInfoUpdate(FarmerInfo {
                current_difficulty: 4.0,
                current_points: 1820,
            })
        );
    }

    #[test]
    fn executable_payload_is_unrecognized_not_evaluated() {
        let line = "GET /farmer response: {'current_difficulty': __import__('os').getpid(), \
                    'current_points': 1}";
        assert_eq!(
            classifier().classify(line),
            ClassifiedOutcome::Unrecognized(UnrecognizedReason::MalformedPayload(
                PayloadKind::Farmer
            ))
        );
    }

    #[test]
    fn payload_missing_required_keys_is_unrecognized() {
        let line = "GET /pool_info response: {'description': 'no name here'}";
        assert_eq!(
            classifier().classify(line),
            ClassifiedOutcome::Unrecognized(UnrecognizedReason::MalformedPayload(
                PayloadKind::PoolInfo
            ))
        );
    }

    #[test]
    fn classifies_points_line() {
        let line = "2024-05-01T12:00:00.000 farmer chia.farmer.farmer: INFO Points: 42";
        assert_eq!(
            classifier().classify(line),
            ClassifiedOutcome::PointsUpdate(42)
        );
    }

    #[test]
    fn classifies_fee_line_with_and_without_gpu_flag() {
        let c = classifier();
        let with_gpu = "harvester: INFO Found proof: fee_rate = 3.75 %, used_gpu = True";
        assert_eq!(
            c.classify(with_gpu),
            ClassifiedOutcome::FeeCandidateLine(FeeInfo {
                gpu_used: true,
                fee_rate_percent: 3.75,
            })
        );

        let without_gpu = "harvester: INFO Found proof, fee_rate = 2.0 %";
        assert_eq!(
            c.classify(without_gpu),
            ClassifiedOutcome::FeeCandidateLine(FeeInfo {
                gpu_used: false,
                fee_rate_percent: 2.0,
            })
        );
    }

    #[test]
    fn fee_annotation_without_found_proof_marker_is_ignored() {
        let line = "harvester: INFO compression stats: fee_rate = 3.75 %";
        assert!(classifier().classify(line).is_unrecognized());
    }

    #[test]
    fn ordering_prefers_earlier_marker() {
        // A points marker inside a pool response is still a pool response.
        let line = "GET /pool_info response: {'name': 'Points: 9', 'fee': 1}";
        assert!(matches!(
            classifier().classify(line),
            ClassifiedOutcome::PoolInfoUpdate(_)
        ));
    }

    #[test]
    fn unrelated_lines_are_unrecognized() {
        let c = classifier();
        for line in [
            "",
            "2024-05-01T12:00:00.000 full_node chia.full_node: INFO Added block",
            "Found 3 proofs",
        ] {
            assert_eq!(
                c.classify(line),
                ClassifiedOutcome::Unrecognized(UnrecognizedReason::NoMatch)
            );
        }
    }

    #[test]
    fn discord_handle_strips_parentheses() {
        assert_eq!(discord_handle("Pool (@ops)"), "@ops");
        assert_eq!(discord_handle("single"), "single");
        assert_eq!(discord_handle(""), "");
    }

    proptest! {
        #[test]
        fn proof_line_round_trips(
            eligible in 0u64..100_000,
            proofs in 0u64..1_000,
            millis in 0u64..120_000,
            total in 0u64..10_000_000,
        ) {
            let time = format!("{}.{:03}", millis / 1000, millis % 1000);
            let outcome = classifier().classify(&proof_line(eligible, proofs, &time, total));
            let ClassifiedOutcome::ProofEvent(event) = outcome else {
                return Err(TestCaseError::fail(format!("not a proof event: {outcome:?}")));
            };
            prop_assert_eq!(event.eligible_plots, eligible);
            prop_assert_eq!(event.proofs_found, proofs);
            prop_assert_eq!(event.total_plots, total);
            prop_assert!((event.time_taken_secs - millis as f64 / 1000.0).abs() < 1e-9);
        }

        #[test]
        fn classify_never_panics(line in "\\PC{0,200}") {
            let _ = classifier().classify(&line);
        }
    }
}
