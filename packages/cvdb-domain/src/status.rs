use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResumeStatus {
	Queued,
	Success,
	Error,
}
impl ResumeStatus {
	pub const ALL: [Self; 3] = [Self::Queued, Self::Success, Self::Error];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Queued => "QUEUED",
			Self::Success => "SUCCESS",
			Self::Error => "ERROR",
		}
	}

	pub fn parse(value: &str) -> Option<Self> {
		match value.trim() {
			"QUEUED" => Some(Self::Queued),
			"SUCCESS" => Some(Self::Success),
			"ERROR" => Some(Self::Error),
			_ => None,
		}
	}

	pub fn is_terminal(self) -> bool {
		!matches!(self, Self::Queued)
	}

	/// `QUEUED` moves exactly once to `SUCCESS` or `ERROR`; terminal states never move.
	pub fn can_transition(self, to: Self) -> bool {
		matches!((self, to), (Self::Queued, Self::Success) | (Self::Queued, Self::Error))
	}
}

impl std::fmt::Display for ResumeStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn queued_moves_to_terminal_states_only() {
		assert!(ResumeStatus::Queued.can_transition(ResumeStatus::Success));
		assert!(ResumeStatus::Queued.can_transition(ResumeStatus::Error));
		assert!(!ResumeStatus::Queued.can_transition(ResumeStatus::Queued));
	}

	#[test]
	fn terminal_states_never_move() {
		for from in [ResumeStatus::Success, ResumeStatus::Error] {
			assert!(from.is_terminal());

			for to in ResumeStatus::ALL {
				assert!(!from.can_transition(to), "{from} must not move to {to}.");
			}
		}
	}

	#[test]
	fn parse_accepts_only_enumerated_values() {
		for status in ResumeStatus::ALL {
			assert_eq!(ResumeStatus::parse(status.as_str()), Some(status));
		}

		assert_eq!(ResumeStatus::parse("queued"), None);
		assert_eq!(ResumeStatus::parse("DONE"), None);
	}

	#[test]
	fn serializes_as_column_value() {
		let json = serde_json::to_string(&ResumeStatus::Success).expect("Failed to serialize.");

		assert_eq!(json, "\"SUCCESS\"");
	}
}
