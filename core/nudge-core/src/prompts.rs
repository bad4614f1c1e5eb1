//! Intervention prompt bank and prompt selection.

use nudge_daemon_protocol::Tone;
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::types::StallKind;

/// Source of prompt choices. Injected so tests can pin the selection.
pub trait RandomSource: Send {
    /// Returns an index in `0..len`. `len` is always at least 1.
    fn pick(&mut self, len: usize) -> usize;
}

/// Thread-local RNG backed source used by the daemon.
#[derive(Debug, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn pick(&mut self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len.max(1))
    }
}

/// Always returns the same index.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedRandom(pub usize);

impl RandomSource for FixedRandom {
    fn pick(&mut self, _len: usize) -> usize {
        self.0
    }
}

/// Replays a fixed sequence of picks, cycling when exhausted.
#[derive(Debug, Clone)]
pub struct SequenceRandom {
    picks: Vec<usize>,
    cursor: usize,
}

impl SequenceRandom {
    pub fn new(picks: Vec<usize>) -> Self {
        Self { picks, cursor: 0 }
    }
}

impl RandomSource for SequenceRandom {
    fn pick(&mut self, _len: usize) -> usize {
        if self.picks.is_empty() {
            return 0;
        }
        let value = self.picks[self.cursor % self.picks.len()];
        self.cursor = self.cursor.wrapping_add(1);
        value
    }
}

const FALLBACK_PROMPT: &str = "Continue.";

#[derive(Debug, Clone, Serialize)]
pub struct PromptBank {
    variants: BTreeMap<Tone, BTreeMap<StallKind, Vec<String>>>,
}

impl Default for PromptBank {
    fn default() -> Self {
        let mut bank = Self {
            variants: BTreeMap::new(),
        };

        bank.insert(
            Tone::Gentle,
            StallKind::TabLoop,
            &["One sentence now.", "Come back to the page. One line is enough."],
        );
        bank.insert(
            Tone::Gentle,
            StallKind::DwellFreeze,
            &["Write ugly first draft.", "Type anything. You can fix it later."],
        );
        bank.insert(
            Tone::Gentle,
            StallKind::ScrollLoop,
            &["Stop reading. Add one line.", "You've read enough for now. Add a sentence."],
        );
        bank.insert(
            Tone::Firm,
            StallKind::TabLoop,
            &["Close the other tabs. Write one sentence.", "Tab loop. Back to the task now."],
        );
        bank.insert(
            Tone::Firm,
            StallKind::DwellFreeze,
            &["Stalled. Type the next word now.", "No more waiting. Draft badly, right now."],
        );
        bank.insert(
            Tone::Firm,
            StallKind::ScrollLoop,
            &["Stop scrolling. Write.", "Reading is not writing. Add one line now."],
        );

        bank
    }
}

impl PromptBank {
    fn insert(&mut self, tone: Tone, kind: StallKind, prompts: &[&str]) {
        self.variants
            .entry(tone)
            .or_default()
            .insert(kind, prompts.iter().map(|p| p.to_string()).collect());
    }

    pub fn variants(&self, tone: Tone, kind: StallKind) -> &[String] {
        self.variants
            .get(&tone)
            .and_then(|by_kind| by_kind.get(&kind))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Chooses a prompt for `(tone, kind)`. Out-of-range picks are clamped.
    pub fn choose(&self, tone: Tone, kind: StallKind, random: &mut dyn RandomSource) -> String {
        let variants = self.variants(tone, kind);
        if variants.is_empty() {
            return FALLBACK_PROMPT.to_string();
        }
        let index = random.pick(variants.len()).min(variants.len() - 1);
        variants[index].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tone_and_kind_has_variants() {
        let bank = PromptBank::default();
        for tone in Tone::ALL {
            for kind in StallKind::ALL {
                assert!(!bank.variants(tone, kind).is_empty(), "{tone:?}/{kind:?}");
            }
        }
    }

    #[test]
    fn fixed_source_pins_choice() {
        let bank = PromptBank::default();
        let prompt = bank.choose(Tone::Gentle, StallKind::DwellFreeze, &mut FixedRandom(0));
        assert_eq!(prompt, "Write ugly first draft.");
    }

    #[test]
    fn out_of_range_pick_is_clamped() {
        let bank = PromptBank::default();
        let variants = bank.variants(Tone::Firm, StallKind::ScrollLoop).to_vec();
        let prompt = bank.choose(Tone::Firm, StallKind::ScrollLoop, &mut FixedRandom(99));
        assert_eq!(&prompt, variants.last().unwrap());
    }

    #[test]
    fn tone_selects_wording() {
        let bank = PromptBank::default();
        let gentle = bank.choose(Tone::Gentle, StallKind::TabLoop, &mut FixedRandom(0));
        let firm = bank.choose(Tone::Firm, StallKind::TabLoop, &mut FixedRandom(0));
        assert_ne!(gentle, firm);
    }

    #[test]
    fn sequence_source_cycles() {
        let mut random = SequenceRandom::new(vec![1, 0]);
        assert_eq!(random.pick(2), 1);
        assert_eq!(random.pick(2), 0);
        assert_eq!(random.pick(2), 1);
    }

    #[test]
    fn thread_random_stays_in_range() {
        let mut random = ThreadRandom;
        for _ in 0..100 {
            assert!(random.pick(3) < 3);
        }
    }
}
