//! Peer ranking labels, parsing and aggregation

use super::{AggregateRanking, LabelMap, Stage2Ranking};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

const FINAL_RANKING_HEADER: &str = "FINAL RANKING:";

fn numbered_entry() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+\.\s*(Response [A-Z]+)\b").expect("valid ranking pattern"))
}

fn any_label() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Response [A-Z]+\b").expect("valid label pattern"))
}

/// `0 → "Response A"`, ..., `25 → "Response Z"`, `26 → "Response AA"`, ...
///
/// Letters continue column-style so every index gets a distinct label.
pub fn response_label(index: usize) -> String {
    let mut letters = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        n -= 1;
        letters.push((b'A' + (n % 26) as u8) as char);
        n /= 26;
    }
    let label: String = letters.into_iter().rev().collect();
    format!("Response {}", label)
}

/// Extract the ranked labels from an evaluation, best first.
///
/// Reads the numbered list after `FINAL RANKING:`; falls back to any
/// `Response X` mention in that section, then in the whole text.
pub fn parse_ranking(text: &str) -> Vec<String> {
    let section = text
        .find(FINAL_RANKING_HEADER)
        .map(|idx| &text[idx + FINAL_RANKING_HEADER.len()..]);

    if let Some(section) = section {
        let numbered: Vec<String> = numbered_entry()
            .captures_iter(section)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect();
        if !numbered.is_empty() {
            return numbered;
        }
        return labels_in(section);
    }

    labels_in(text)
}

fn labels_in(text: &str) -> Vec<String> {
    any_label()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Average 1-based position of each model over all parsed rankings, best first
pub fn aggregate_rankings(
    rankings: &[Stage2Ranking],
    label_to_model: &LabelMap,
) -> Vec<AggregateRanking> {
    let mut positions: HashMap<&str, Vec<usize>> = HashMap::new();

    for ranking in rankings {
        for (position, label) in ranking.parsed_ranking.iter().enumerate() {
            if let Some(model) = label_to_model.get(label) {
                positions.entry(model.as_str()).or_default().push(position + 1);
            }
        }
    }

    let mut aggregate: Vec<AggregateRanking> = positions
        .into_iter()
        .map(|(model, ranks)| AggregateRanking {
            model: model.to_string(),
            average_rank: round2(ranks.iter().sum::<usize>() as f64 / ranks.len() as f64),
            rankings_count: ranks.len(),
        })
        .collect();

    aggregate.sort_by(|a, b| {
        a.average_rank
            .total_cmp(&b.average_rank)
            .then_with(|| a.model.cmp(&b.model))
    });
    aggregate
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        assert_eq!(response_label(0), "Response A");
        assert_eq!(response_label(3), "Response D");
        assert_eq!(response_label(25), "Response Z");
        assert_eq!(response_label(26), "Response AA");
        assert_eq!(response_label(27), "Response AB");
        assert_eq!(response_label(26 * 27), "Response AAA");
    }

    #[test]
    fn test_labels_stay_distinct_past_z() {
        let labels: std::collections::HashSet<String> = (0..100).map(response_label).collect();
        assert_eq!(labels.len(), 100);

        let text = "FINAL RANKING:\n1. Response AB\n2. Response A\n3. Response AA";
        assert_eq!(
            parse_ranking(text),
            vec!["Response AB", "Response A", "Response AA"]
        );
    }

    #[test]
    fn test_parse_final_ranking_section() {
        let text = "Response A is thorough. Response C misses the point.\n\n\
                    FINAL RANKING:\n1. Response C\n2. Response A\n3. Response B";
        assert_eq!(parse_ranking(text), vec!["Response C", "Response A", "Response B"]);
    }

    #[test]
    fn test_parse_falls_back_to_mentions() {
        let text = "FINAL RANKING: Response B then Response A";
        assert_eq!(parse_ranking(text), vec!["Response B", "Response A"]);

        let text = "I prefer Response A over Response B";
        assert_eq!(parse_ranking(text), vec!["Response A", "Response B"]);

        assert!(parse_ranking("no labels here").is_empty());
    }

    #[test]
    fn test_aggregate_average_position() {
        let label_to_model: LabelMap = [
            ("Response A".to_string(), "m/a".to_string()),
            ("Response B".to_string(), "m/b".to_string()),
        ]
        .into_iter()
        .collect();

        let ranking = |order: &[&str]| Stage2Ranking {
            model: "judge".into(),
            ranking: String::new(),
            parsed_ranking: order.iter().map(|s| s.to_string()).collect(),
        };
        let rankings = vec![
            ranking(&["Response A", "Response B"]),
            ranking(&["Response B", "Response A"]),
            ranking(&["Response A", "Response B", "Response Z"]),
        ];

        let aggregate = aggregate_rankings(&rankings, &label_to_model);
        assert_eq!(aggregate.len(), 2);
        assert_eq!(aggregate[0].model, "m/a");
        assert_eq!(aggregate[0].average_rank, 1.33);
        assert_eq!(aggregate[0].rankings_count, 3);
        assert_eq!(aggregate[1].model, "m/b");
        assert_eq!(aggregate[1].average_rank, 1.67);
    }
}
