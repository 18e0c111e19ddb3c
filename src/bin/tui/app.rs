use crossterm::event::KeyCode;
use serde::Deserialize;

use market_dashboard::query::{self, QueryResult, QuerySpec, SortKey};
use market_dashboard::types::{Category, DashboardOverview, MarketRecord};

// ---------------------------------------------------------------------------
// API response types (mirror routes.rs shapes)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct MarketsResponse {
    pub records: Vec<MarketRecord>,
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Error(String),
    Connecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    /// Typing into the search box; keys edit the buffer.
    Search,
}

/// What the event loop should do after a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    Refresh,
    Quit,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub status: ConnectionStatus,
    /// Full, unfiltered snapshot as served by GET /markets.
    pub markets: Vec<MarketRecord>,
    pub overview: DashboardOverview,
    pub spec: QuerySpec,
    /// `markets` run through the pipeline with `spec`.
    pub view: QueryResult,
    pub mode: InputMode,
    pub selected: Option<usize>,
    pub last_refresh: std::time::Instant,
    pub base_url: String,
}

impl AppState {
    pub fn new(base_url: String) -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            markets: Vec::new(),
            overview: DashboardOverview::default(),
            spec: QuerySpec::default(),
            view: QueryResult {
                records: Vec::new(),
                total: 0,
            },
            mode: InputMode::Normal,
            selected: None,
            last_refresh: std::time::Instant::now(),
            base_url,
        }
    }

    /// Replace the snapshot and re-run the pipeline over it.
    pub fn set_markets(&mut self, markets: Vec<MarketRecord>) {
        self.markets = markets;
        self.apply();
    }

    fn apply(&mut self) {
        self.view = query::run(&self.markets, &self.spec);
        self.selected = match (self.selected, self.view.len()) {
            (_, 0) => None,
            (Some(i), n) => Some(i.min(n - 1)),
            (None, _) => None,
        };
    }

    pub fn selected_market(&self) -> Option<&MarketRecord> {
        self.selected.and_then(|i| self.view.records.get(i))
    }

    /// Category filter in cycle order: all, then each category.
    fn cycle_category(&mut self) {
        let current = self.spec.category.as_deref().map(Category::from_tag);
        let next = match current {
            None => Some(Category::ALL[0]),
            Some(c) => Category::ALL
                .iter()
                .position(|x| *x == c)
                .and_then(|i| Category::ALL.get(i + 1))
                .copied(),
        };
        self.spec.category = next.map(|c| c.as_str().to_string());
    }

    pub fn handle_key(&mut self, code: KeyCode) -> Action {
        if self.mode == InputMode::Search {
            match code {
                KeyCode::Enter | KeyCode::Esc => self.mode = InputMode::Normal,
                KeyCode::Backspace => {
                    self.spec.search_text.pop();
                    self.apply();
                }
                KeyCode::Char(c) => {
                    self.spec.search_text.push(c);
                    self.apply();
                }
                _ => {}
            }
            return Action::None;
        }

        match code {
            KeyCode::Char('q') | KeyCode::Char('Q') => return Action::Quit,
            KeyCode::Char('r') | KeyCode::Char('R') => return Action::Refresh,
            KeyCode::Char('s') => {
                self.spec.sort_by = self.spec.sort_by.next();
                self.apply();
            }
            KeyCode::Char('o') => {
                self.spec.sort_order = self.spec.sort_order.reversed();
                self.apply();
            }
            KeyCode::Char('c') => {
                self.cycle_category();
                self.apply();
            }
            KeyCode::Char('/') => self.mode = InputMode::Search,
            KeyCode::Char('x') => {
                self.spec.clear_filters();
                self.apply();
            }
            KeyCode::Down | KeyCode::Char('j') => {
                let max = self.view.len().saturating_sub(1);
                self.selected = Some(self.selected.map_or(0, |i| (i + 1).min(max)));
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected = Some(self.selected.map_or(0, |i| i.saturating_sub(1)));
            }
            _ => {}
        }
        Action::None
    }

    pub fn sort_label(&self) -> String {
        let key = match self.spec.sort_by {
            SortKey::Rank => "rank",
            SortKey::Price => "price",
            SortKey::Change24h => "24h change",
            SortKey::Volume24h => "volume",
            SortKey::MarketCap => "market cap",
        };
        format!("{key} {}", self.spec.sort_order.as_str())
    }

    pub async fn refresh(&mut self, client: &reqwest::Client) {
        let markets_url = format!("{}/markets", self.base_url);
        let overview_url = format!("{}/dashboard/overview", self.base_url);

        let (markets_res, overview_res) = tokio::join!(
            client.get(&markets_url).send(),
            client.get(&overview_url).send(),
        );

        let resp = match markets_res {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                self.status = ConnectionStatus::Error(format!("server returned {}", r.status()));
                return;
            }
            Err(e) => {
                self.status = ConnectionStatus::Error(format!("{e}"));
                return;
            }
        };

        match resp.json::<MarketsResponse>().await {
            Ok(m) => {
                self.set_markets(m.records);
                self.status = ConnectionStatus::Connected;
                self.last_refresh = std::time::Instant::now();
            }
            Err(e) => {
                self.status = ConnectionStatus::Error(format!("parse error: {e}"));
                return;
            }
        }

        if let Ok(o) = overview_res {
            if let Ok(overview) = o.json::<DashboardOverview>().await {
                self.overview = overview;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

/// Up to two decimals, trailing zeros dropped, thousands separated.
pub fn format_number(v: f64) -> String {
    let fixed = format!("{:.2}", v.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((&fixed, ""));
    let frac = frac_part.trim_end_matches('0');

    let mut out = group_thousands(int_part);
    if !frac.is_empty() {
        out.push('.');
        out.push_str(frac);
    }
    if v < 0.0 && out != "0" {
        out.insert(0, '-');
    }
    out
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// 845e9 -> "845B", 1.23e12 -> "1.23T".
pub fn format_large_number(v: f64) -> String {
    const UNITS: [(f64, &str); 4] = [(1e12, "T"), (1e9, "B"), (1e6, "M"), (1e3, "K")];
    for (scale, suffix) in UNITS {
        if v >= scale {
            return format!("{}{suffix}", format_number(v / scale));
        }
    }
    format_number(v)
}

pub fn format_percentage(v: f64) -> String {
    let sign = if v > 0.0 { "+" } else { "" };
    format!("{sign}{v:.2}%")
}

/// US-dollar amount with two decimals.
pub fn format_price(v: f64) -> String {
    let fixed = format!("{:.2}", v.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((&fixed, "00"));
    let sign = if v < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{sign}${}.{frac_part}", group_thousands(int_part))
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use market_dashboard::query::SortOrder;

    fn market(symbol: &str, name: &str, rank: u32, price: f64, category: Category) -> MarketRecord {
        MarketRecord {
            id: rank.to_string(),
            symbol: symbol.to_string(),
            name: name.to_string(),
            price,
            change_24h: 0.0,
            change_percent_24h: 0.0,
            volume_24h: 0.0,
            market_cap: 0.0,
            rank,
            category,
            image: None,
            last_updated: Utc::now(),
        }
    }

    fn app() -> AppState {
        let mut app = AppState::new("http://localhost:3000".to_string());
        app.set_markets(vec![
            market("BTC", "Bitcoin", 1, 43250.75, Category::Cryptocurrency),
            market("ETH", "Ethereum", 2, 2650.45, Category::Cryptocurrency),
            market("UNI", "Uniswap", 3, 6.1, Category::Defi),
        ]);
        app
    }

    fn shown(app: &AppState) -> Vec<&str> {
        app.view.records.iter().map(|m| m.symbol.as_str()).collect()
    }

    #[test]
    fn keys_reshape_view() {
        let mut app = app();
        assert_eq!(shown(&app), ["BTC", "ETH", "UNI"]);

        app.handle_key(KeyCode::Char('o'));
        assert_eq!(app.spec.sort_order, SortOrder::Desc);
        assert_eq!(shown(&app), ["UNI", "ETH", "BTC"]);

        app.handle_key(KeyCode::Char('s'));
        assert_eq!(app.spec.sort_by, SortKey::Price);
        assert_eq!(shown(&app), ["BTC", "ETH", "UNI"]);
        assert_eq!(app.sort_label(), "price desc");
    }

    #[test]
    fn category_cycle_wraps_to_all() {
        let mut app = app();
        app.handle_key(KeyCode::Char('c'));
        assert_eq!(app.spec.category.as_deref(), Some(Category::ALL[0].as_str()));
        for _ in 1..Category::ALL.len() {
            app.handle_key(KeyCode::Char('c'));
        }
        assert_eq!(app.spec.category.as_deref(), Some(Category::ALL[Category::ALL.len() - 1].as_str()));
        app.handle_key(KeyCode::Char('c'));
        assert!(app.spec.category.is_none());
        assert_eq!(app.view.len(), 3);
    }

    #[test]
    fn search_mode_edits_text_then_clear_resets() {
        let mut app = app();
        app.handle_key(KeyCode::Char('/'));
        assert_eq!(app.mode, InputMode::Search);
        for c in "swap".chars() {
            assert_eq!(app.handle_key(KeyCode::Char(c)), Action::None);
        }
        assert_eq!(shown(&app), ["UNI"]);
        app.handle_key(KeyCode::Enter);
        assert_eq!(app.mode, InputMode::Normal);

        app.handle_key(KeyCode::Char('x'));
        assert!(app.spec.search_text.is_empty());
        assert_eq!(app.view.len(), 3);
    }

    #[test]
    fn q_quits_only_outside_search() {
        let mut app = app();
        app.handle_key(KeyCode::Char('/'));
        assert_eq!(app.handle_key(KeyCode::Char('q')), Action::None);
        app.handle_key(KeyCode::Esc);
        assert_eq!(app.handle_key(KeyCode::Char('q')), Action::Quit);
        assert_eq!(app.handle_key(KeyCode::Char('r')), Action::Refresh);
    }

    #[test]
    fn selection_is_clamped_to_view() {
        let mut app = app();
        for _ in 0..5 {
            app.handle_key(KeyCode::Char('j'));
        }
        assert_eq!(app.selected, Some(2));
        app.handle_key(KeyCode::Char('/'));
        app.handle_key(KeyCode::Char('b'));
        assert_eq!(app.selected, Some(0));
        assert_eq!(app.selected_market().unwrap().symbol, "BTC");
    }

    #[test]
    fn large_numbers_use_suffixes() {
        assert_eq!(format_large_number(845e9), "845B");
        assert_eq!(format_large_number(1.2345e12), "1.23T");
        assert_eq!(format_large_number(450e6), "450M");
        assert_eq!(format_large_number(1500.0), "1.5K");
        assert_eq!(format_large_number(999.0), "999");
    }

    #[test]
    fn percentages_carry_sign() {
        assert_eq!(format_percentage(2.98), "+2.98%");
        assert_eq!(format_percentage(-3.11), "-3.11%");
        assert_eq!(format_percentage(0.0), "0.00%");
    }

    #[test]
    fn prices_are_grouped_dollars() {
        assert_eq!(format_price(43250.75), "$43,250.75");
        assert_eq!(format_price(0.485), "$0.48");
        assert_eq!(format_price(-85.2), "-$85.20");
        assert_eq!(format_price(1_234_567.0), "$1,234,567.00");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("Bitcoin", 10), "Bitcoin");
        assert_eq!(truncate("Avalanche", 5), "Aval…");
        assert_eq!(truncate("ÆØÅÆØÅ", 3), "ÆØ…");
    }
}
