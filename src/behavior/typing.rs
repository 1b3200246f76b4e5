//! Keystroke sequence synthesis
//!
//! Emits variable-cadence keystrokes with occasional typo-then-correct noise.
//! Whatever noise is injected, replaying the plan's type/backspace actions in
//! order always renders exactly the requested text.

use rand::rngs::StdRng;
use rand::Rng;

/// Base inter-keystroke delay band in milliseconds.
const BASE_DELAY_MS: std::ops::RangeInclusive<u64> = 40..=120;
/// Extra delay added for capitals and symbols (shift reach).
const SHIFT_PENALTY_MS: std::ops::RangeInclusive<u64> = 50..=150;
/// Pause between a typo and its correction.
const TYPO_NOTICE_MS: std::ops::RangeInclusive<u64> = 150..=400;
/// Occasional longer "thinking" pause.
const THINKING_PAUSE_MS: std::ops::RangeInclusive<u64> = 400..=1200;
/// Fraction of characters followed by a thinking pause.
const THINKING_RATE: f64 = 0.05;

/// A single simulated input action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TypingAction {
    Type { char: char },
    Backspace,
    Wait,
}

/// One action plus the dwell before executing it.
#[derive(Debug, Clone, Copy)]
pub struct TypingStep {
    pub action: TypingAction,
    pub delay_ms: u64,
}

/// An ordered keystroke sequence for one field.
#[derive(Debug, Clone)]
pub struct TypingPlan {
    pub steps: Vec<TypingStep>,
}

impl TypingPlan {
    /// Replay only the text-mutating actions and return the rendered string.
    pub fn replay(&self) -> String {
        let mut rendered = String::new();
        for step in &self.steps {
            match step.action {
                TypingAction::Type { char } => rendered.push(char),
                TypingAction::Backspace => {
                    rendered.pop();
                }
                TypingAction::Wait => {}
            }
        }
        rendered
    }

    /// Total dwell across the plan.
    pub fn total_delay_ms(&self) -> u64 {
        self.steps.iter().map(|s| s.delay_ms).sum()
    }
}

/// Build a plan for `text` with the given typo injection rate.
pub(super) fn build_plan(rng: &mut StdRng, text: &str, error_rate: f64) -> TypingPlan {
    let error_rate = error_rate.clamp(0.0, 1.0);
    let mut steps = Vec::with_capacity(text.chars().count() * 2);

    for ch in text.chars() {
        if rng.gen_bool(error_rate) {
            // Fat-finger a neighboring key, notice, and correct it.
            steps.push(TypingStep {
                action: TypingAction::Type { char: slip_char(rng, ch) },
                delay_ms: char_delay(rng, ch),
            });
            steps.push(TypingStep {
                action: TypingAction::Wait,
                delay_ms: rng.gen_range(TYPO_NOTICE_MS),
            });
            steps.push(TypingStep {
                action: TypingAction::Backspace,
                delay_ms: rng.gen_range(BASE_DELAY_MS),
            });
        }

        steps.push(TypingStep {
            action: TypingAction::Type { char: ch },
            delay_ms: char_delay(rng, ch),
        });

        if rng.gen_bool(THINKING_RATE) {
            steps.push(TypingStep {
                action: TypingAction::Wait,
                delay_ms: rng.gen_range(THINKING_PAUSE_MS),
            });
        }
    }

    TypingPlan { steps }
}

/// Delay for one keystroke, widened when the character needs shift.
fn char_delay(rng: &mut StdRng, ch: char) -> u64 {
    let mut delay = rng.gen_range(BASE_DELAY_MS);
    if ch.is_uppercase() || (!ch.is_alphanumeric() && !ch.is_whitespace()) {
        delay += rng.gen_range(SHIFT_PENALTY_MS);
    }
    delay
}

/// A plausible wrong character for `ch`: a horizontal keyboard neighbor for
/// letters, an adjacent digit for digits, otherwise a nearby-home-row letter.
fn slip_char(rng: &mut StdRng, ch: char) -> char {
    const ROWS: &[&str] = &["qwertyuiop", "asdfghjkl", "zxcvbnm"];

    let lower = ch.to_ascii_lowercase();
    if let Some(row) = ROWS.iter().find(|r| r.contains(lower)) {
        let idx = row.find(lower).unwrap_or(0);
        let neighbor = if idx == 0 || (idx + 1 < row.len() && rng.gen_bool(0.5)) {
            row.as_bytes()[idx + 1]
        } else {
            row.as_bytes()[idx - 1]
        } as char;
        return if ch.is_uppercase() { neighbor.to_ascii_uppercase() } else { neighbor };
    }

    if let Some(digit) = ch.to_digit(10) {
        return char::from_digit((digit + 1) % 10, 10).unwrap_or('0');
    }

    const HOME: &[char] = &['a', 's', 'd', 'f', 'j', 'k', 'l'];
    HOME[rng.gen_range(0..HOME.len())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::BehaviorSynthesizer;

    #[test]
    fn test_replay_reconstructs_text_without_errors() {
        let mut synth = BehaviorSynthesizer::with_seed(5);
        let plan = synth.typing_plan("Acme Plumbing", 0.0);
        assert_eq!(plan.replay(), "Acme Plumbing");
        assert!(!plan.steps.iter().any(|s| s.action == TypingAction::Backspace));
    }

    #[test]
    fn test_replay_reconstructs_text_across_error_rates() {
        let mut synth = BehaviorSynthesizer::with_seed(6);
        let text = "12 Canal St, Springfield IL 62701";
        for rate in [0.0, 0.05, 0.3, 0.7, 1.0] {
            let plan = synth.typing_plan(text, rate);
            assert_eq!(plan.replay(), text, "error_rate {}", rate);
        }
    }

    #[test]
    fn test_full_error_rate_injects_corrections() {
        let mut synth = BehaviorSynthesizer::with_seed(7);
        let plan = synth.typing_plan("abc", 1.0);
        let backspaces = plan
            .steps
            .iter()
            .filter(|s| s.action == TypingAction::Backspace)
            .count();
        assert_eq!(backspaces, 3);
        assert_eq!(plan.replay(), "abc");
    }

    #[test]
    fn test_shifted_characters_take_longer_on_average() {
        let mut synth = BehaviorSynthesizer::with_seed(8);
        let lower: u64 = (0..50)
            .map(|_| synth.typing_plan("m", 0.0).total_delay_ms())
            .sum();
        let upper: u64 = (0..50)
            .map(|_| synth.typing_plan("M", 0.0).total_delay_ms())
            .sum();
        assert!(upper > lower);
    }

    #[test]
    fn test_empty_text_yields_empty_plan() {
        let mut synth = BehaviorSynthesizer::with_seed(9);
        let plan = synth.typing_plan("", 0.5);
        assert!(plan.steps.is_empty());
        assert_eq!(plan.replay(), "");
    }
}
