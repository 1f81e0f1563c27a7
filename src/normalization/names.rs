use strsim::jaro_winkler;

use crate::database_ops::entities::{Competitor, Feature};

/// Minimum Jaro-Winkler similarity for a "did you mean" suggestion.
pub const MIN_SUGGESTION_SIMILARITY: f64 = 0.80;

/// Shortest normalized key allowed to take part in substring matching. Keeps
/// two-letter tokens like "tr" from matching half the roster.
const MIN_SUBSTRING_LEN: usize = 3;

/// Anything with a display name that spreadsheet headers and folder names refer to.
pub trait Named {
    fn name(&self) -> &str;
}

impl Named for Competitor {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for Feature {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Canonical comparison key for a competitor or feature label.
///
/// - lowercase, Turkish letters folded to ASCII (`ı`→`i`, `ş`→`s`, ...)
/// - whitespace and punctuation dropped
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameKey(String);

impl NameKey {
    pub fn new(raw: &str) -> Self {
        let key = raw
            .trim()
            .chars()
            .flat_map(char::to_lowercase)
            .map(fold_turkish)
            .filter(|c| c.is_alphanumeric())
            .collect();
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn similarity(&self, other: &Self) -> f64 {
        jaro_winkler(&self.0, &other.0)
    }
}

fn fold_turkish(c: char) -> char {
    match c {
        'ı' | 'î' => 'i',
        'ş' => 's',
        'ğ' => 'g',
        'ü' | 'û' => 'u',
        'ö' => 'o',
        'ç' => 'c',
        'â' => 'a',
        // lowercase('İ') yields 'i' + combining dot; the dot is dropped by the filter
        other => other,
    }
}

#[derive(Debug)]
pub enum Resolution<'a, T> {
    Exact(&'a T),
    Substring(&'a T),
    Unresolved { suggestion: Option<&'a T> },
}

impl<'a, T> Resolution<'a, T> {
    pub fn matched(&self) -> Option<&'a T> {
        match self {
            Resolution::Exact(t) | Resolution::Substring(t) => Some(t),
            Resolution::Unresolved { .. } => None,
        }
    }
}

/// Exact key match only. Used for feature columns and rule targets, where a
/// loose match would silently file evidence under the wrong feature.
pub fn resolve_exact<'a, T: Named>(raw: &str, candidates: &'a [T]) -> Option<&'a T> {
    let key = NameKey::new(raw);
    if key.is_empty() {
        return None;
    }
    candidates.iter().find(|c| NameKey::new(c.name()) == key)
}

/// Exact key match first, then substring containment in either direction.
/// Among substring hits the longest candidate name wins, then the
/// alphabetically first, so results are stable across runs.
pub fn resolve<'a, T: Named>(raw: &str, candidates: &'a [T]) -> Resolution<'a, T> {
    let key = NameKey::new(raw);
    if key.is_empty() {
        return Resolution::Unresolved { suggestion: None };
    }
    if let Some(hit) = resolve_exact(raw, candidates) {
        return Resolution::Exact(hit);
    }

    let mut best: Option<(&T, usize)> = None;
    for candidate in candidates {
        let ck = NameKey::new(candidate.name());
        let shorter = ck.as_str().len().min(key.as_str().len());
        if shorter < MIN_SUBSTRING_LEN {
            continue;
        }
        if !(ck.as_str().contains(key.as_str()) || key.as_str().contains(ck.as_str())) {
            continue;
        }
        let len = ck.as_str().len();
        let better = match best {
            None => true,
            Some((current, current_len)) => {
                len > current_len || (len == current_len && candidate.name() < current.name())
            }
        };
        if better {
            best = Some((candidate, len));
        }
    }
    if let Some((hit, _)) = best {
        return Resolution::Substring(hit);
    }

    Resolution::Unresolved {
        suggestion: suggest(&key, candidates),
    }
}

fn suggest<'a, T: Named>(key: &NameKey, candidates: &'a [T]) -> Option<&'a T> {
    candidates
        .iter()
        .map(|c| (c, key.similarity(&NameKey::new(c.name()))))
        .filter(|(_, score)| *score >= MIN_SUGGESTION_SIMILARITY)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(c, _)| c)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Label(&'static str);

    impl Named for Label {
        fn name(&self) -> &str {
            self.0
        }
    }

    fn roster() -> Vec<Label> {
        vec![
            Label("Binance"),
            Label("Binance TR"),
            Label("BTCTurk"),
            Label("OKX TR"),
            Label("OKX"),
            Label("Garanti Kripto"),
        ]
    }

    #[test]
    fn keys_ignore_case_spacing_and_turkish_letters() {
        assert_eq!(NameKey::new("Binance TR"), NameKey::new("binancetr"));
        assert_eq!(NameKey::new("BTC Turk"), NameKey::new("btcturk"));
        assert_eq!(
            NameKey::new("TRY Nemalandırma"),
            NameKey::new("try nemalandirma")
        );
        assert_eq!(NameKey::new("İcrypex").as_str(), "icrypex");
    }

    #[test]
    fn exact_match_beats_substring() {
        let roster = roster();
        match resolve("okx tr", &roster) {
            Resolution::Exact(hit) => assert_eq!(hit.0, "OKX TR"),
            other => panic!("expected exact match, got {:?}", other.matched().map(|l| l.0)),
        }
        assert!(matches!(resolve("Binance", &roster), Resolution::Exact(l) if l.0 == "Binance"));
    }

    #[test]
    fn substring_prefers_longest_candidate() {
        let roster = roster();
        match resolve("Binance TR Pro", &roster) {
            Resolution::Substring(hit) => assert_eq!(hit.0, "Binance TR"),
            other => panic!("unexpected {:?}", other.matched().map(|l| l.0)),
        }
        match resolve("Garanti", &roster) {
            Resolution::Substring(hit) => assert_eq!(hit.0, "Garanti Kripto"),
            other => panic!("unexpected {:?}", other.matched().map(|l| l.0)),
        }
    }

    #[test]
    fn short_tokens_do_not_substring_match() {
        let roster = roster();
        assert!(resolve("TR", &roster).matched().is_none());
        assert!(resolve("   ", &roster).matched().is_none());
    }

    #[test]
    fn unresolved_names_carry_a_suggestion() {
        let roster = roster();
        match resolve("BTCTruk", &roster) {
            Resolution::Unresolved { suggestion } => {
                assert_eq!(suggestion.map(|l| l.0), Some("BTCTurk"))
            }
            other => panic!("unexpected {:?}", other.matched().map(|l| l.0)),
        }
        match resolve("Coinbase", &roster) {
            Resolution::Unresolved { suggestion } => assert!(suggestion.is_none()),
            other => panic!("unexpected {:?}", other.matched().map(|l| l.0)),
        }
    }

    #[test]
    fn exact_only_resolution_skips_substrings() {
        let roster = roster();
        assert_eq!(resolve_exact("binance tr", &roster).map(|l| l.0), Some("Binance TR"));
        assert!(resolve_exact("Garanti", &roster).is_none());
    }
}
