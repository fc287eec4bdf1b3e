use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::data::CanonicalTable;
use crate::reference::Category;

/// Headline figures shown on the dashboard cards.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DecisionSummary {
    pub total_decisions: u64,
    pub latest_decision_date: Option<NaiveDate>,
    pub per_jurisdiction: Vec<JurisdictionShare>,
}

/// Per-jurisdiction share of the canonical table.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JurisdictionShare {
    pub jurisdiction: Category,
    pub decisions: u64,
    pub share: f64,
}

impl DecisionSummary {
    /// Compute the summary; jurisdictions come out in label order, `NotSpecified` last.
    pub fn from_table(table: &CanonicalTable) -> Self {
        let total_decisions = table.total_decisions();
        let mut counts: BTreeMap<&Category, u64> = BTreeMap::new();
        for record in table.records() {
            *counts.entry(&record.jurisdiction).or_insert(0) += record.n_decisions;
        }
        let per_jurisdiction = counts
            .into_iter()
            .map(|(jurisdiction, decisions)| JurisdictionShare {
                jurisdiction: jurisdiction.clone(),
                decisions,
                share: if total_decisions == 0 {
                    0.0
                } else {
                    decisions as f64 / total_decisions as f64
                },
            })
            .collect();
        Self {
            total_decisions,
            latest_decision_date: table.latest_decision_date(),
            per_jurisdiction,
        }
    }

    /// Decisions for one jurisdiction label; 0 when absent.
    pub fn decisions_for(&self, jurisdiction: &Category) -> u64 {
        self.per_jurisdiction
            .iter()
            .find(|share| &share.jurisdiction == jurisdiction)
            .map(|share| share.decisions)
            .unwrap_or(0)
    }
}

/// Group digits by thousands with spaces (`1234567` -> `1 234 567`).
pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut formatted = String::with_capacity(digits.len() + digits.len() / 3);
    for (position, digit) in digits.chars().enumerate() {
        if position > 0 && (digits.len() - position) % 3 == 0 {
            formatted.push(' ');
        }
        formatted.push(digit);
    }
    formatted
}

/// Day-first date (`dd/mm/yyyy`).
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}
