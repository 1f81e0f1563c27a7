//! Folder/file name → feature rules for screenshot reconciliation.
//!
//! Rules are an ordered list of `(pattern, feature)` pairs. Matching is a
//! case-insensitive substring test and the first matching rule wins, so more
//! specific patterns ("locked staking") must come before generic ones ("staking").

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub pattern: String,
    pub feature: String,
}

#[derive(Debug, Clone)]
pub struct KeywordRules {
    rules: Vec<KeywordRule>,
    // normalized patterns, index-aligned with `rules`
    needles: Vec<String>,
}

const DEFAULT_RULES: &[(&str, &str)] = &[
    ("try nemalandırma", "TRY Nemalandırma"),
    ("try nemalandirma", "TRY Nemalandırma"),
    ("nemalandırma", "TRY Nemalandırma"),
    ("nemalandirma", "TRY Nemalandırma"),
    ("try earn", "TRY Nemalandırma"),
    ("locked staking", "Locked Staking"),
    ("locked earn", "Locked Staking"),
    ("flexible staking", "Flexible Staking"),
    ("staking", "Flexible Staking"),
    ("stake", "Flexible Staking"),
    ("earn", "Flexible Staking"),
    ("kyc", "KYC & Identity Verification"),
    ("identity", "KYC & Identity Verification"),
    ("verification", "KYC & Identity Verification"),
    ("onboarding", "User Onboarding"),
    ("welcome", "User Onboarding"),
    ("getting started", "User Onboarding"),
    ("sign up", "User Onboarding"),
    ("signup", "User Onboarding"),
    ("copy trading", "Copy Trading"),
    ("copy trade", "Copy Trading"),
    ("social trading", "Copy Trading"),
    ("convert", "Convert"),
    ("conversion", "Convert"),
    ("swap", "Convert"),
    ("referral", "Referral"),
    ("refer", "Referral"),
    ("invite", "Referral"),
    ("nft", "NFT / Marketplace"),
    ("marketplace", "NFT / Marketplace"),
    ("collectibles", "NFT / Marketplace"),
    ("ai tool", "AI Sentimentals"),
    ("sentiment", "AI Sentimentals"),
    ("chatbot", "AI Sentimentals"),
    ("assistant", "AI Sentimentals"),
    ("dashboard", "Dashboard & Wallet"),
    ("wallet", "Dashboard & Wallet"),
    ("portfolio", "Dashboard & Wallet"),
    ("balance", "Dashboard & Wallet"),
    ("payment", "Pay (Payments)"),
    ("deposit", "Pay (Payments)"),
    ("withdraw", "Pay (Payments)"),
    ("web app", "Web App"),
    ("desktop", "Web App"),
    ("browser", "Web App"),
    ("mobile", "Mobile App"),
    ("ios", "Mobile App"),
    ("android", "Mobile App"),
];

/// Lowercase, `-`/`_` as spaces, runs of whitespace collapsed.
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .replace(['-', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

impl KeywordRules {
    pub fn new(rules: Vec<KeywordRule>) -> Self {
        let rules: Vec<KeywordRule> = rules
            .into_iter()
            .filter(|r| !normalize(&r.pattern).is_empty())
            .collect();
        let needles = rules.iter().map(|r| normalize(&r.pattern)).collect();
        Self { rules, needles }
    }

    pub fn builtin() -> Self {
        Self::new(
            DEFAULT_RULES
                .iter()
                .map(|(pattern, feature)| KeywordRule {
                    pattern: (*pattern).to_string(),
                    feature: (*feature).to_string(),
                })
                .collect(),
        )
    }

    /// Reads a JSON array of `{"pattern": .., "feature": ..}` objects. The file
    /// replaces the built-in list; order in the file is match order.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading keyword rules {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("parsing keyword rules {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let rules: Vec<KeywordRule> = serde_json::from_str(raw)?;
        Ok(Self::new(rules))
    }

    pub fn rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Feature name of the first rule whose pattern occurs in `text`.
    pub fn match_text(&self, text: &str) -> Option<&str> {
        let haystack = normalize(text);
        if haystack.is_empty() {
            return None;
        }
        self.needles
            .iter()
            .position(|needle| haystack.contains(needle.as_str()))
            .map(|idx| self.rules[idx].feature.as_str())
    }

    /// Feature for a discovered file. Files directly under the competitor
    /// folder match on their filename (extension stripped). Files in
    /// subfolders match on the innermost folder first, then outward, then on
    /// the filename.
    pub fn match_file(&self, subfolders: &[String], file_name: &str) -> Option<&str> {
        subfolders
            .iter()
            .rev()
            .find_map(|folder| self.match_text(folder))
            .or_else(|| self.match_text(file_stem(file_name)))
    }
}

impl Default for KeywordRules {
    fn default() -> Self {
        Self::builtin()
    }
}

fn file_stem(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folders(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn turkish_folder_names_match_try_earn() {
        let rules = KeywordRules::builtin();
        assert_eq!(rules.match_text("TRY Nemalandırma"), Some("TRY Nemalandırma"));
        assert_eq!(rules.match_text("try-nemalandirma"), Some("TRY Nemalandırma"));
    }

    #[test]
    fn specific_patterns_win_over_generic_ones() {
        let rules = KeywordRules::builtin();
        assert_eq!(rules.match_text("Locked Staking"), Some("Locked Staking"));
        assert_eq!(rules.match_text("flexible_staking"), Some("Flexible Staking"));
        assert_eq!(rules.match_text("Copy Trading"), Some("Copy Trading"));
        assert_eq!(rules.match_text("KYC Flow"), Some("KYC & Identity Verification"));
    }

    #[test]
    fn bare_short_words_do_not_hijack_unrelated_names() {
        let rules = KeywordRules::builtin();
        assert_eq!(rules.match_text("Happy path"), None);
        assert_eq!(rules.match_text("random"), None);
        assert_eq!(rules.match_text(""), None);
    }

    #[test]
    fn innermost_folder_is_checked_first() {
        let rules = KeywordRules::builtin();
        let hit = rules.match_file(&folders(&["Wallet", "Convert"]), "shot1.png");
        assert_eq!(hit, Some("Convert"));
        let hit = rules.match_file(&folders(&["Wallet", "misc"]), "shot1.png");
        assert_eq!(hit, Some("Dashboard & Wallet"));
    }

    #[test]
    fn root_files_match_on_filename_stem() {
        let rules = KeywordRules::builtin();
        assert_eq!(rules.match_file(&[], "referral-page.png"), Some("Referral"));
        assert_eq!(rules.match_file(&[], "IMG_0042.png"), None);
    }

    #[test]
    fn json_rules_replace_builtins_and_keep_order() {
        let rules = KeywordRules::from_json(
            r#"[{"pattern": "earn", "feature": "Earn Hub"},
                {"pattern": "locked earn", "feature": "Locked Staking"},
                {"pattern": "  ", "feature": "ignored"}]"#,
        )
        .unwrap();
        assert_eq!(rules.len(), 2);
        // first match wins even when a later rule is more specific
        assert_eq!(rules.match_text("Locked Earn"), Some("Earn Hub"));
        assert_eq!(rules.match_text("Mobile"), None);
    }

    #[test]
    fn rules_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(&path, r#"[{"pattern": "launchpad", "feature": "Launchpad"}]"#).unwrap();
        let rules = KeywordRules::from_json_file(&path).unwrap();
        assert_eq!(rules.match_text("Launchpad Q3"), Some("Launchpad"));
        assert!(KeywordRules::from_json_file(&dir.path().join("missing.json")).is_err());
    }
}
