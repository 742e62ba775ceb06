//! Puzzle store: filtered candidate retrieval over the corpus.
//!
//! The store filters, it never ranks. `MemoryPuzzleStore` keeps two per-theme
//! indexes, one ordered by rating and one by popularity, and picks whichever
//! answers a query with the smaller scan.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::ThemeInfo;
use crate::error::LessonError;
use crate::types::{PuzzleRecord, RatingInterval};

/// Hard ceiling on rows returned by one fetch, whatever the caller asks for
pub const STORE_POOL_CAP: usize = 5000;

/// Filter criteria for one candidate fetch
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub theme: String,
    pub interval: RatingInterval,
    pub min_popularity: Option<i32>,
    pub excluded_themes: BTreeSet<String>,
    pub pool_size: usize,
}

impl CandidateQuery {
    fn admits(&self, record: &PuzzleRecord) -> bool {
        let rated_in_band = record.rating.map_or(false, |r| self.interval.contains(r));
        let popular_enough = self.min_popularity.map_or(true, |min| record.popularity >= min);
        let not_excluded = record.themes.is_disjoint(&self.excluded_themes);
        rated_in_band && popular_enough && not_excluded
    }
}

/// Read-only corpus access. Implementations must allow concurrent readers.
#[async_trait]
pub trait PuzzleStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns at most `query.pool_size` records (capped at `STORE_POOL_CAP`)
    /// matching theme, rating interval, popularity floor and exclusions.
    /// Order is unspecified.
    async fn fetch_candidates(&self, query: &CandidateQuery) -> Result<Vec<PuzzleRecord>, LessonError>;
}

/// Indexed in-memory corpus
pub struct MemoryPuzzleStore {
    records: Vec<PuzzleRecord>,
    by_rating: HashMap<String, Vec<usize>>,
    by_popularity: HashMap<String, Vec<usize>>,
}

impl MemoryPuzzleStore {
    /// Build indexes for every registered theme. A record belongs to a theme if
    /// it carries the tag itself or any of the theme's sub-themes.
    pub fn new(records: Vec<PuzzleRecord>, themes: &BTreeMap<String, ThemeInfo>) -> Self {
        let mut seen: HashSet<String> = HashSet::new();
        let mut kept = Vec::with_capacity(records.len());
        let mut dropped = 0usize;
        for record in records {
            if record.fen.trim().is_empty() || record.solution.is_empty() {
                dropped += 1;
                continue;
            }
            if !seen.insert(record.id.clone()) {
                dropped += 1;
                continue;
            }
            kept.push(record);
        }
        if dropped > 0 {
            warn!(dropped, "Dropped puzzle records with empty position/solution or duplicate id");
        }

        let mut by_rating: HashMap<String, Vec<usize>> = HashMap::new();
        for (name, info) in themes {
            let members: Vec<usize> = kept
                .iter()
                .enumerate()
                .filter(|(_, r)| r.rating.is_some())
                .filter(|(_, r)| r.has_theme(name) || info.sub_themes.iter().any(|s| r.has_theme(s)))
                .map(|(idx, _)| idx)
                .collect();
            by_rating.insert(name.clone(), members);
        }

        let mut by_popularity = by_rating.clone();
        for idx in by_rating.values_mut() {
            idx.sort_by(|&a, &b| {
                kept[a].rating.cmp(&kept[b].rating).then_with(|| kept[a].id.cmp(&kept[b].id))
            });
        }
        for idx in by_popularity.values_mut() {
            idx.sort_by(|&a, &b| {
                kept[b].popularity.cmp(&kept[a].popularity).then_with(|| kept[a].id.cmp(&kept[b].id))
            });
        }

        info!(records = kept.len(), themes = by_rating.len(), "Puzzle store indexed");

        Self {
            records: kept,
            by_rating,
            by_popularity,
        }
    }

    /// Load a Lichess puzzle CSV export
    /// (`PuzzleId,FEN,Moves,Rating,RatingDeviation,Popularity,NbPlays,Themes,GameUrl,OpeningTags`).
    pub fn from_lichess_csv(
        path: impl AsRef<Path>,
        themes: &BTreeMap<String, ThemeInfo>,
    ) -> Result<Self, LessonError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            LessonError::StoreUnavailable(format!("cannot open {}: {}", path.display(), e))
        })?;
        let reader = BufReader::new(file);

        let mut records = Vec::new();
        let mut malformed = 0usize;
        for (line_no, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| {
                LessonError::StoreUnavailable(format!(
                    "read error in {} at line {}: {}",
                    path.display(),
                    line_no + 1,
                    e
                ))
            })?;
            if line_no == 0 && line.starts_with("PuzzleId") {
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }
            match parse_lichess_row(&line) {
                Some(record) => records.push(record),
                None => malformed += 1,
            }
        }

        if malformed > 0 {
            warn!(malformed, path = %path.display(), "Skipped malformed puzzle rows");
        }
        info!(rows = records.len(), path = %path.display(), "Loaded puzzle corpus");
        Ok(Self::new(records, themes))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of rated records indexed under each theme
    pub fn theme_counts(&self) -> BTreeMap<String, usize> {
        self.by_rating
            .iter()
            .map(|(theme, idx)| (theme.clone(), idx.len()))
            .collect()
    }

    fn rating_range(&self, index: &[usize], interval: RatingInterval) -> (usize, usize) {
        let rating = |i: usize| self.records[index[i]].rating.unwrap_or(0);
        let lo = partition(index.len(), |i| rating(i) < interval.low);
        let hi = partition(index.len(), |i| rating(i) <= interval.high);
        (lo, hi.max(lo))
    }

    /// Walk a popularity index until `pool_size` rows are admitted. The index is
    /// sorted by popularity, so the walk stops at the first row under the floor.
    /// Returns the rows and how many index entries were visited.
    fn scan_popular(&self, index: &[usize], query: &CandidateQuery, pool_size: usize) -> (Vec<PuzzleRecord>, usize) {
        let mut scanned = 0;
        let records: Vec<PuzzleRecord> = index
            .iter()
            .map(|&i| &self.records[i])
            .take_while(|r| query.min_popularity.map_or(true, |min| r.popularity >= min))
            .inspect(|_| scanned += 1)
            .filter(|r| query.admits(r))
            .take(pool_size)
            .cloned()
            .collect();
        (records, scanned)
    }
}

/// First position in `0..len` where `pred` turns false
fn partition(len: usize, pred: impl Fn(usize) -> bool) -> usize {
    let (mut lo, mut hi) = (0, len);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if pred(mid) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

#[async_trait]
impl PuzzleStore for MemoryPuzzleStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn fetch_candidates(&self, query: &CandidateQuery) -> Result<Vec<PuzzleRecord>, LessonError> {
        let by_rating = self
            .by_rating
            .get(&query.theme)
            .ok_or_else(|| LessonError::ThemeNotFound(query.theme.clone()))?;
        let pool_size = query.pool_size.min(STORE_POOL_CAP);
        if pool_size == 0 || query.interval.is_empty() {
            return Ok(Vec::new());
        }

        let (lo, hi) = self.rating_range(by_rating, query.interval);
        let in_band = hi - lo;

        // Narrow band: the rating slice is the whole answer. Wide band: walk the
        // popularity index so the pool holds the most popular in-band rows.
        let (records, scanned) = if in_band <= pool_size {
            let records: Vec<PuzzleRecord> = by_rating[lo..hi]
                .iter()
                .map(|&i| &self.records[i])
                .filter(|r| query.admits(r))
                .cloned()
                .collect();
            (records, in_band)
        } else {
            let by_popularity = self
                .by_popularity
                .get(&query.theme)
                .ok_or_else(|| LessonError::ThemeNotFound(query.theme.clone()))?;
            self.scan_popular(by_popularity, query, pool_size)
        };

        debug!(
            theme = %query.theme,
            interval = %query.interval,
            in_band,
            scanned,
            returned = records.len(),
            pool_size,
            "Fetched candidates"
        );

        Ok(records)
    }
}

/// Parse one Lichess CSV row; None if any required field is missing or invalid
pub fn parse_lichess_row(line: &str) -> Option<PuzzleRecord> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() < 8 {
        return None;
    }
    let id = fields[0].trim();
    let fen = fields[1].trim();
    let solution: Vec<String> = fields[2].split_whitespace().map(str::to_string).collect();
    if id.is_empty() || fen.is_empty() || solution.is_empty() {
        return None;
    }
    let rating = match fields[3].trim() {
        "" => None,
        r => match r.parse::<u32>().ok()? {
            0 => None,
            n => Some(n),
        },
    };
    let popularity = fields[5].trim().parse::<i32>().unwrap_or(0);
    let plays = fields[6].trim().parse::<u32>().unwrap_or(0);
    let themes = fields[7].split_whitespace().map(str::to_string).collect();
    let game_url = fields
        .get(8)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Some(PuzzleRecord {
        id: id.to_string(),
        fen: fen.to_string(),
        solution,
        rating,
        themes,
        popularity,
        plays,
        game_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn record(id: &str, rating: Option<u32>, popularity: i32, themes: &[&str]) -> PuzzleRecord {
        PuzzleRecord {
            id: id.to_string(),
            fen: format!("8/8/8/8/8/8/8/K6k w - - 0 {}", id.len()),
            solution: vec!["a1a2".to_string(), "h1h2".to_string()],
            rating,
            themes: themes.iter().map(|s| s.to_string()).collect(),
            popularity,
            plays: 100,
            game_url: None,
        }
    }

    fn query(theme: &str, low: u32, high: u32, pool_size: usize) -> CandidateQuery {
        CandidateQuery {
            theme: theme.to_string(),
            interval: RatingInterval::new(low, high),
            min_popularity: None,
            excluded_themes: BTreeSet::new(),
            pool_size,
        }
    }

    fn store(records: Vec<PuzzleRecord>) -> MemoryPuzzleStore {
        MemoryPuzzleStore::new(records, &EngineConfig::default().themes)
    }

    #[tokio::test]
    async fn test_filters_rating_and_theme() {
        let store = store(vec![
            record("a", Some(1300), 80, &["pin"]),
            record("b", Some(1900), 80, &["pin"]),
            record("c", Some(1500), 80, &["fork"]),
            record("d", None, 80, &["pin"]),
        ]);
        let got = store.fetch_candidates(&query("pin", 1200, 1800, 10)).await.unwrap();
        let ids: Vec<_> = got.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[tokio::test]
    async fn test_popularity_floor_and_exclusions() {
        let store = store(vec![
            record("a", Some(1300), 10, &["pin"]),
            record("b", Some(1400), 90, &["pin", "endgame"]),
            record("c", Some(1500), 90, &["pin"]),
        ]);
        let mut q = query("pin", 1200, 1800, 10);
        q.min_popularity = Some(50);
        q.excluded_themes.insert("endgame".to_string());
        let got = store.fetch_candidates(&q).await.unwrap();
        let ids: Vec<_> = got.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c"]);
    }

    #[tokio::test]
    async fn test_unknown_theme_is_not_found() {
        let store = store(vec![record("a", Some(1300), 10, &["pin"])]);
        let err = store.fetch_candidates(&query("castling", 0, 3000, 10)).await.unwrap_err();
        assert!(matches!(err, LessonError::ThemeNotFound(t) if t == "castling"));
    }

    #[tokio::test]
    async fn test_category_membership_via_sub_themes() {
        let store = store(vec![
            record("a", Some(1300), 10, &["mateIn2"]),
            record("b", Some(1400), 10, &["backRankMate"]),
            record("c", Some(1500), 10, &["fork"]),
        ]);
        let got = store.fetch_candidates(&query("mate", 1200, 1800, 10)).await.unwrap();
        assert_eq!(got.len(), 2);
    }

    #[tokio::test]
    async fn test_wide_band_prefers_popular_rows() {
        let records: Vec<_> = (0..20)
            .map(|i| record(&format!("p{:02}", i), Some(1200 + i * 10), i as i32, &["fork"]))
            .collect();
        let store = store(records);
        let got = store.fetch_candidates(&query("fork", 1200, 1800, 5)).await.unwrap();
        let ids: Vec<_> = got.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["p19", "p18", "p17", "p16", "p15"]);
    }

    #[tokio::test]
    async fn test_wide_band_scan_stops_at_popularity_floor() {
        let records: Vec<_> = (0..20)
            .map(|i| record(&format!("p{:02}", i), Some(1200 + i * 10), i as i32, &["fork"]))
            .collect();
        let store = store(records);
        let mut q = query("fork", 1200, 1800, 10);
        q.min_popularity = Some(15);

        let got = store.fetch_candidates(&q).await.unwrap();
        let ids: Vec<_> = got.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["p19", "p18", "p17", "p16", "p15"]);

        let (rows, scanned) = store.scan_popular(&store.by_popularity["fork"], &q, 10);
        assert_eq!(rows.len(), 5);
        assert_eq!(scanned, 5);
    }

    #[test]
    fn test_drops_invalid_and_duplicate_records() {
        let mut empty = record("x", Some(1300), 0, &["pin"]);
        empty.solution.clear();
        let store = store(vec![
            record("a", Some(1300), 0, &["pin"]),
            record("a", Some(1400), 0, &["pin"]),
            empty,
        ]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.theme_counts().get("pin"), Some(&1));
    }

    #[test]
    fn test_parse_lichess_row() {
        let line = "00sHx,q3k1nr/1pp1nQpp/3p4/1P2p3/4P3/B1PP1b2/B5PP/5K2 b k - 0 17,e8d7 a2e6 d7d8 f7f8,1760,80,83,72,mate mateIn2 middlegame short,https://lichess.org/yyznGmXs/black#34,Italian_Game";
        let record = parse_lichess_row(line).unwrap();
        assert_eq!(record.id, "00sHx");
        assert_eq!(record.solution.len(), 4);
        assert_eq!(record.rating, Some(1760));
        assert_eq!(record.popularity, 83);
        assert_eq!(record.plays, 72);
        assert!(record.has_theme("mateIn2"));
        assert_eq!(record.game_url.as_deref(), Some("https://lichess.org/yyznGmXs/black#34"));

        assert!(parse_lichess_row("only,three,fields").is_none());
        assert!(parse_lichess_row("id,fen,,1500,80,83,72,pin,").is_none());
    }

    #[test]
    fn test_missing_csv_is_store_unavailable() {
        let err = MemoryPuzzleStore::from_lichess_csv(
            "/nonexistent/puzzles.csv",
            &EngineConfig::default().themes,
        )
        .err()
        .unwrap();
        assert!(matches!(err, LessonError::StoreUnavailable(_)));
    }
}
