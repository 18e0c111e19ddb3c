use serde::Serialize;

use crate::error::QueryError;
use crate::query::compare::compare;
use crate::query::filter::matches;
use crate::query::search::matches_search;
use crate::query::spec::{QueryParams, QuerySpec};
use crate::types::MarketRecord;

/// Ordered view produced by one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub records: Vec<MarketRecord>,
    /// Size of the snapshot the view was cut from.
    pub total: usize,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Filter, search, then stable-sort `snapshot` according to `spec`.
///
/// Pure and deterministic: the same inputs always give the same sequence,
/// and records with equal sort keys keep their snapshot order in either
/// direction. Neither input is modified.
pub fn run(snapshot: &[MarketRecord], spec: &QuerySpec) -> QueryResult {
    let mut kept: Vec<&MarketRecord> = snapshot
        .iter()
        .filter(|r| matches(r, spec) && matches_search(r, &spec.search_text))
        .collect();

    // slice::sort_by is stable.
    kept.sort_by(|a, b| compare(a, b, spec.sort_by, spec.sort_order));

    QueryResult {
        records: kept.into_iter().cloned().collect(),
        total: snapshot.len(),
    }
}

/// `run` behind the untyped parameter boundary. Fails only on an
/// unrecognized sort key or order.
pub fn run_params(snapshot: &[MarketRecord], params: QueryParams) -> Result<QueryResult, QueryError> {
    let spec = QuerySpec::try_from(params)?;
    Ok(run(snapshot, &spec))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::fixtures::{btc_eth, record, symbols};
    use crate::query::spec::{SortKey, SortOrder};
    use crate::types::Category;

    fn five() -> Vec<MarketRecord> {
        let mut v = vec![
            record("BTC", "Bitcoin", 1, 43250.75, 845e9),
            record("ETH", "Ethereum", 2, 2650.45, 318e9),
            record("SOL", "Solana", 3, 98.76, 45e9),
            record("ADA", "Cardano", 4, 0.485, 17e9),
            record("AVAX", "Avalanche", 5, 36.75, 14.5e9),
        ];
        v[0].volume_24h = 28.5e9;
        v[1].volume_24h = 15.2e9;
        v[2].volume_24h = 2.1e9;
        v[3].volume_24h = 0.45e9;
        v[4].volume_24h = 0.68e9;
        v
    }

    // --- scenarios on the BTC/ETH snapshot ---------------------------------

    #[test]
    fn scenario_market_cap_descending() {
        let spec = QuerySpec::sorted_by(SortKey::MarketCap, SortOrder::Desc);
        let out = run(&btc_eth(), &spec);
        assert_eq!(symbols(&out.records), ["BTC", "ETH"]);
        assert_eq!(out.total, 2);
    }

    #[test]
    fn scenario_min_price_excludes_eth() {
        let spec = QuerySpec {
            min_price: Some(3000.0),
            ..QuerySpec::default()
        };
        assert_eq!(symbols(&run(&btc_eth(), &spec).records), ["BTC"]);
    }

    #[test]
    fn scenario_search_matches_name_case_insensitively() {
        let spec = QuerySpec {
            search_text: "eth".to_string(),
            ..QuerySpec::default()
        };
        assert_eq!(symbols(&run(&btc_eth(), &spec).records), ["ETH"]);
    }

    #[test]
    fn scenario_unreachable_price_is_empty() {
        let spec = QuerySpec {
            min_price: Some(100_000.0),
            ..QuerySpec::default()
        };
        let out = run(&btc_eth(), &spec);
        assert!(out.is_empty());
        assert_eq!(out.total, 2);
    }

    #[test]
    fn scenario_absent_category_is_empty() {
        let spec = QuerySpec {
            category: Some("defi".to_string()),
            ..QuerySpec::default()
        };
        assert!(run(&btc_eth(), &spec).is_empty());
    }

    // --- properties --------------------------------------------------------

    #[test]
    fn no_op_spec_sorts_by_rank_and_drops_nothing() {
        let mut shuffled = five();
        shuffled.swap(0, 4);
        shuffled.swap(1, 3);

        let out = run(&shuffled, &QuerySpec::default());
        assert_eq!(out.len(), 5);
        assert_eq!(symbols(&out.records), ["BTC", "ETH", "SOL", "ADA", "AVAX"]);
    }

    #[test]
    fn equal_keys_keep_input_order_in_both_directions() {
        let snapshot = vec![
            record("AAA", "a", 1, 10.0, 1.0),
            record("BBB", "b", 2, 5.0, 1.0),
            record("CCC", "c", 3, 10.0, 1.0),
            record("DDD", "d", 4, 5.0, 1.0),
            record("EEE", "e", 5, 10.0, 1.0),
        ];

        let asc = run(&snapshot, &QuerySpec::sorted_by(SortKey::Price, SortOrder::Asc));
        assert_eq!(symbols(&asc.records), ["BBB", "DDD", "AAA", "CCC", "EEE"]);

        let desc = run(&snapshot, &QuerySpec::sorted_by(SortKey::Price, SortOrder::Desc));
        assert_eq!(symbols(&desc.records), ["AAA", "CCC", "EEE", "BBB", "DDD"]);

        // All-equal key: output is the input order, either way.
        let caps = run(&snapshot, &QuerySpec::sorted_by(SortKey::MarketCap, SortOrder::Desc));
        assert_eq!(symbols(&caps.records), ["AAA", "BBB", "CCC", "DDD", "EEE"]);
    }

    #[test]
    fn signed_zero_changes_keep_input_order() {
        let mut a = record("AAA", "a", 1, 1.0, 1.0);
        let mut b = record("BBB", "b", 2, 1.0, 1.0);
        a.change_24h = 0.0;
        b.change_24h = -0.0;
        let snapshot = vec![a, b];

        for order in [SortOrder::Asc, SortOrder::Desc] {
            let out = run(&snapshot, &QuerySpec::sorted_by(SortKey::Change24h, order));
            assert_eq!(symbols(&out.records), ["AAA", "BBB"]);
        }
    }

    #[test]
    fn repeated_runs_are_identical() {
        let spec = QuerySpec {
            max_price: Some(50_000.0),
            search_text: "a".to_string(),
            ..QuerySpec::sorted_by(SortKey::Volume24h, SortOrder::Desc)
        };
        let snapshot = five();
        let first = run(&snapshot, &spec);
        let second = run(&snapshot, &spec);
        assert_eq!(first, second);
        assert_eq!(symbols(&first.records), ["SOL", "AVAX", "ADA"]);
    }

    #[test]
    fn inputs_are_not_modified() {
        let snapshot = five();
        let before = snapshot.clone();
        let spec = QuerySpec::sorted_by(SortKey::Price, SortOrder::Asc);
        let spec_before = spec.clone();
        let _ = run(&snapshot, &spec);
        assert_eq!(snapshot, before);
        assert_eq!(spec, spec_before);
    }

    #[test]
    fn filter_search_and_sort_compose() {
        let mut snapshot = five();
        snapshot[2].category = Category::Defi;
        snapshot[4].category = Category::Defi;

        let spec = QuerySpec {
            category: Some("defi".to_string()),
            search_text: "a".to_string(),
            ..QuerySpec::sorted_by(SortKey::Price, SortOrder::Asc)
        };
        assert_eq!(symbols(&run(&snapshot, &spec).records), ["AVAX", "SOL"]);
    }

    #[test]
    fn contradictory_bounds_yield_empty_not_error() {
        let spec = QuerySpec {
            min_volume: Some(10e9),
            max_volume: Some(1e9),
            ..QuerySpec::default()
        };
        assert!(run(&five(), &spec).is_empty());
    }

    #[test]
    fn empty_snapshot_yields_empty_result() {
        let out = run(&[], &QuerySpec::default());
        assert!(out.is_empty());
        assert_eq!(out.total, 0);
    }

    #[test]
    fn run_params_propagates_invalid_sort_key() {
        let params = QueryParams {
            sort_by: Some("name".to_string()),
            ..QueryParams::default()
        };
        assert_eq!(
            run_params(&five(), params).unwrap_err(),
            QueryError::InvalidSortKey("name".to_string())
        );
    }

    #[test]
    fn run_params_applies_parsed_spec() {
        let params = QueryParams {
            sort_by: Some("price".to_string()),
            sort_order: Some("desc".to_string()),
            max_price: Some(100.0),
            ..QueryParams::default()
        };
        let out = run_params(&five(), params).unwrap();
        assert_eq!(symbols(&out.records), ["SOL", "AVAX", "ADA"]);
    }
}
