//! Coordinator key layout, as fixed by the spec: `agentic:run:{run_id}:turn:{turn_seq}:lease`,
//! `…:cancel`, and `agentic:run:{run_id}:events` for the live channel.

const LEASE_PREFIX: &str = "agentic:run";
const EVENT_CHANNEL_PREFIX: &str = "agentic:run";

pub fn turn_lease_key(run_id: &str, turn_seq: i64) -> String {
    format!("{LEASE_PREFIX}:{run_id}:turn:{turn_seq}:lease")
}

pub fn turn_cancel_key(run_id: &str, turn_seq: i64) -> String {
    format!("{LEASE_PREFIX}:{run_id}:turn:{turn_seq}:cancel")
}

pub fn live_event_channel(run_id: &str) -> String {
    format!("{EVENT_CHANNEL_PREFIX}:{run_id}:events")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_the_documented_layout() {
        assert_eq!(turn_lease_key("r1", 2), "agentic:run:r1:turn:2:lease");
        assert_eq!(turn_cancel_key("r1", 2), "agentic:run:r1:turn:2:cancel");
        assert_eq!(live_event_channel("r1"), "agentic:run:r1:events");
    }
}
