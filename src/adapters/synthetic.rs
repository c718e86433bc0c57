use crate::config::toml_config::ClassificationConfig;
use crate::core::window::RecencyWindow;
use crate::domain::model::TaggingResults;
use crate::domain::ports::ContactDirectory;
use crate::utils::error::Result;
use serde_json::{json, Map, Value};

const DEFAULT_POPULATION: usize = 60;

const A_SUBSCRIPTIONS: [&str; 7] = [
    "Core",
    "Live",
    "Yearly + Live",
    "Coaching",
    "Free Trial",
    "Administrator",
    "",
];
const B_SUBSCRIPTIONS: [&str; 6] = ["core", "live", "coach", "free", "admin", ""];

/// Deterministic stand-in for the contacts API used by `--test` runs.
///
/// Produces a mix of single- and multi-profile emails on both platforms,
/// fee waivers by tag and purchase, mixed-case emails, a few records
/// outside the precise window and a few malformed ones.
pub struct SyntheticDirectory {
    rules: ClassificationConfig,
    population: usize,
}

impl SyntheticDirectory {
    pub fn new(rules: &ClassificationConfig) -> Self {
        Self {
            rules: rules.clone(),
            population: DEFAULT_POPULATION,
        }
    }

    pub fn with_population(mut self, population: usize) -> Self {
        self.population = population;
        self
    }

    fn email(i: usize) -> String {
        if i % 7 == 0 {
            format!("Test.User{}@Example.com", i)
        } else {
            format!("test.user{}@example.com", i)
        }
    }

    fn last_seen(i: usize, window: &RecencyWindow) -> i64 {
        let cutoff = window.cutoff.timestamp();
        if i % 13 == 12 {
            // Between query_start and cutoff: fetched but outside the window.
            return cutoff - 60;
        }
        let span = (window.now.timestamp() - cutoff).max(1);
        window.now.timestamp() - (i as i64 * 3_607) % span
    }

    fn profile(&self, i: usize, profile: usize, on_b: bool, window: &RecencyWindow) -> Value {
        let rules = &self.rules;
        let mut attributes = Map::new();
        let external_id = if on_b {
            let sub = B_SUBSCRIPTIONS[(i + profile) % B_SUBSCRIPTIONS.len()];
            attributes.insert(rules.b_subscription_attribute.clone(), json!(sub));
            format!("{}_{:05}{}", rules.b_external_id_prefix, i, profile)
        } else {
            let course = A_SUBSCRIPTIONS[(i + profile) % A_SUBSCRIPTIONS.len()];
            attributes.insert(rules.a_subscription_attribute.clone(), json!(course));
            if i % 11 == 0 {
                attributes.insert(
                    rules.purchase_names_attribute.clone(),
                    json!("Core Course, Fee Waiver Bundle"),
                );
            }
            format!("{}", 900_000 + i * 10 + profile)
        };

        let tags: Vec<Value> = if i % 5 == 0 {
            vec![json!({"type": "tag", "id": rules.fee_waiver_tag_id})]
        } else {
            vec![]
        };

        json!({
            "type": "contact",
            "id": format!("synthetic-{}-{}", i, profile),
            "role": "user",
            "email": Self::email(i),
            "external_id": external_id,
            "last_seen_at": Self::last_seen(i, window),
            "tags": {"type": "list", "data": tags},
            "custom_attributes": attributes,
        })
    }
}

#[async_trait::async_trait]
impl ContactDirectory for SyntheticDirectory {
    async fn search_active(&self, window: &RecencyWindow) -> Result<Vec<Value>> {
        let mut records = Vec::with_capacity(self.population * 2);

        for i in 0..self.population {
            if i % 17 == 16 {
                records.push(json!({
                    "type": "contact",
                    "id": format!("synthetic-{}-0", i),
                    "external_id": format!("{}", 900_000 + i * 10),
                    "last_seen_at": window.now.timestamp(),
                }));
                continue;
            }

            match i % 4 {
                0 => records.push(self.profile(i, 0, false, window)),
                1 => records.push(self.profile(i, 0, true, window)),
                2 => {
                    records.push(self.profile(i, 0, false, window));
                    records.push(self.profile(i, 1, true, window));
                }
                _ => {
                    records.push(self.profile(i, 0, false, window));
                    records.push(self.profile(i, 1, false, window));
                }
            }
        }

        tracing::info!("🧪 Generated {} synthetic contact records", records.len());
        Ok(records)
    }

    async fn tag_profiles(
        &self,
        _tag_name: &str,
        _profile_ids: &[String],
    ) -> Result<Option<TaggingResults>> {
        tracing::info!("Tagging skipped in test mode");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classifier::classify;
    use crate::domain::model::Contact;
    use chrono::{TimeZone, Utc};

    fn window() -> RecencyWindow {
        RecencyWindow::ending_at(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(), 3)
    }

    #[tokio::test]
    async fn test_generation_is_deterministic() {
        let directory = SyntheticDirectory::new(&ClassificationConfig::default());

        let first = directory.search_active(&window()).await.unwrap();
        let second = directory.search_active(&window()).await.unwrap();

        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[tokio::test]
    async fn test_generated_records_cover_all_categories() {
        let rules = ClassificationConfig::default();
        let window = window();
        let directory = SyntheticDirectory::new(&rules);

        let records = directory.search_active(&window).await.unwrap();
        let total = records.len();
        let contacts: Vec<Contact> = records
            .into_iter()
            .filter_map(|record| Contact::try_from(record).ok())
            .filter(|contact| window.contains(contact.last_seen_at))
            .collect();

        assert!(contacts.len() < total);

        let report = classify(contacts, &rules).report;
        for (_, category_report) in report.categories.iter() {
            assert!(category_report.count > 0);
        }
        assert!(report.fee_waiver_count > 0);
        assert!(report.emails_with_multiple_profiles > 0);
    }

    #[tokio::test]
    async fn test_tagging_is_skipped() {
        let directory = SyntheticDirectory::new(&ClassificationConfig::default());

        let results = directory
            .tag_profiles("tag", &["a".to_string()])
            .await
            .unwrap();

        assert!(results.is_none());
    }
}
