use crate::types::MarketRecord;

/// Case-insensitive substring match on symbol or name. Blank text matches all;
/// any other text is matched as given, surrounding whitespace included.
pub fn matches_search(record: &MarketRecord, search_text: &str) -> bool {
    if search_text.trim().is_empty() {
        return true;
    }
    let needle = search_text.to_lowercase();
    record.symbol.to_lowercase().contains(&needle) || record.name.to_lowercase().contains(&needle)
}
