use super::names::NameKey;
use crate::database_ops::entities::Region;

/// Exchanges licensed in Turkey. Spelling variants collapse through
/// [`NameKey`], so "BTC Turk" and "BTCTurk" are one entry in practice.
pub const TURKISH_EXCHANGES: &[&str] = &[
    "BTCTurk",
    "Paribu",
    "Binance TR",
    "Bitexen",
    "Icrypex",
    "CoinTR",
    "Kucoin TR",
    "OKX TR",
    "BiLira",
    "Ortak App",
    "Garanti Kripto",
    "Gate TR",
    "Midas Kripto",
    "Bybit TR",
    "Kuantist",
];

/// Region for a competitor name. Anything not on the Turkish list is Global.
pub fn region_for(name: &str) -> Region {
    let key = NameKey::new(name);
    if TURKISH_EXCHANGES.iter().any(|tr| NameKey::new(tr) == key) {
        Region::Tr
    } else {
        Region::Global
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turkish_exchanges_resolve_to_tr_in_any_spelling() {
        for name in ["Binance TR", "binancetr", "BTC Turk", "BTCTurk", "okx tr", "Gate TR"] {
            assert_eq!(region_for(name), Region::Tr, "{name}");
        }
    }

    #[test]
    fn everything_else_is_global() {
        for name in ["Coinbase", "Binance", "OKX", "Kraken", ""] {
            assert_eq!(region_for(name), Region::Global, "{name}");
        }
    }
}
