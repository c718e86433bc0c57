//! Partitions contacts by platform membership and tallies subscriptions.
//!
//! Pure: the same contacts and rules always produce the same report.

use crate::config::toml_config::{ClassificationConfig, SubscriptionMerge};
use crate::domain::model::{
    Category, CategoryBreakdown, CensusReport, Contact, Platform, SubscriptionTally,
    UNKNOWN_SUBSCRIPTION,
};
use std::collections::BTreeMap;

/// Contacts split by the platform their profile belongs to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlatformSets {
    pub a: Vec<Contact>,
    pub b: Vec<Contact>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub report: CensusReport,
    /// Profile ids behind platform-A-only emails, in email order.
    pub only_a_profile_ids: Vec<String>,
}

#[derive(Default)]
struct EmailProfiles<'a> {
    a: Vec<&'a Contact>,
    b: Vec<&'a Contact>,
}

impl EmailProfiles<'_> {
    fn len(&self) -> usize {
        self.a.len() + self.b.len()
    }
}

struct Subscription {
    name: String,
    rank: u32,
}

pub fn split_by_platform(contacts: Vec<Contact>, rules: &ClassificationConfig) -> PlatformSets {
    let mut sets = PlatformSets::default();
    for contact in contacts {
        match rules.platform_of(&contact) {
            Platform::A => sets.a.push(contact),
            Platform::B => sets.b.push(contact),
        }
    }
    sets
}

pub fn classify(contacts: Vec<Contact>, rules: &ClassificationConfig) -> Classification {
    aggregate(&split_by_platform(contacts, rules), rules)
}

pub fn aggregate(sets: &PlatformSets, rules: &ClassificationConfig) -> Classification {
    // BTreeMap keeps emails sorted, which makes samples and id order deterministic.
    let mut by_email: BTreeMap<&str, EmailProfiles> = BTreeMap::new();
    for contact in &sets.a {
        by_email.entry(contact.email.as_str()).or_default().a.push(contact);
    }
    for contact in &sets.b {
        by_email.entry(contact.email.as_str()).or_default().b.push(contact);
    }

    let mut categories = seeded_breakdown(rules);
    let mut emails_with_multiple_profiles = 0;
    let mut fee_waiver_count = 0;
    let mut only_a_profile_ids = Vec::new();

    for (email, profiles) in &by_email {
        let Some(category) =
            Category::from_membership(!profiles.a.is_empty(), !profiles.b.is_empty())
        else {
            continue;
        };

        let subscription = resolve_subscription(profiles, rules);
        let fee_waiver = profiles
            .a
            .iter()
            .chain(profiles.b.iter())
            .any(|contact| is_fee_waiver(contact, rules));

        if profiles.len() > 1 {
            emails_with_multiple_profiles += 1;
        }
        if fee_waiver {
            fee_waiver_count += 1;
        }
        if category == Category::OnlyA {
            only_a_profile_ids.extend(profiles.a.iter().filter_map(|contact| contact.id.clone()));
        }

        let entry = categories.get_mut(category);
        entry.count += 1;
        entry.profiles += profiles.len() as u64;
        if fee_waiver {
            entry.fee_waiver_count += 1;
        }
        if entry.sample.len() < rules.sample_size {
            entry.sample.push((*email).to_string());
        }
        entry
            .subscription_breakdown
            .entry(subscription)
            .or_default()
            .record(fee_waiver);
    }

    Classification {
        report: CensusReport {
            total_unique_emails: by_email.len() as u64,
            total_profiles_in_window: (sets.a.len() + sets.b.len()) as u64,
            emails_with_multiple_profiles,
            fee_waiver_count,
            categories,
        },
        only_a_profile_ids,
    }
}

/// Every category lists every known tier, so downstream rows stay stable.
fn seeded_breakdown(rules: &ClassificationConfig) -> CategoryBreakdown {
    let mut breakdown = CategoryBreakdown::default();
    for category in Category::ALL {
        let tallies = &mut breakdown.get_mut(category).subscription_breakdown;
        tallies.insert(UNKNOWN_SUBSCRIPTION.to_string(), SubscriptionTally::default());
        for tier in &rules.tiers {
            tallies.insert(tier.name.clone(), SubscriptionTally::default());
        }
    }
    breakdown
}

/// True when the contact carries the waiver tag or a waiver purchase.
pub fn is_fee_waiver(contact: &Contact, rules: &ClassificationConfig) -> bool {
    if contact.has_tag(&rules.fee_waiver_tag_id) {
        return true;
    }
    contact
        .attribute_str(&rules.purchase_names_attribute)
        .map(|names| {
            names
                .to_lowercase()
                .contains(&rules.waiver_keyword.to_lowercase())
        })
        .unwrap_or(false)
}

fn subscription_of(
    contact: &Contact,
    platform: Platform,
    rules: &ClassificationConfig,
) -> Option<Subscription> {
    let raw = contact.attribute_str(rules.subscription_attribute(platform))?;
    Some(match rules.tier_for(raw) {
        Some(tier) => Subscription {
            name: tier.name.clone(),
            rank: tier.rank,
        },
        None => Subscription {
            name: raw.to_string(),
            rank: 0,
        },
    })
}

/// Highest rank wins; equal ranks go to the alphabetically first name.
fn best(candidates: impl Iterator<Item = Subscription>) -> Option<Subscription> {
    candidates.max_by(|left, right| {
        left.rank
            .cmp(&right.rank)
            .then_with(|| right.name.cmp(&left.name))
    })
}

fn resolve_subscription(profiles: &EmailProfiles, rules: &ClassificationConfig) -> String {
    let on = |contacts: &[&Contact], platform| {
        contacts
            .iter()
            .filter_map(|contact| subscription_of(contact, platform, rules))
            .collect::<Vec<_>>()
    };
    let a = on(&profiles.a, Platform::A);
    let b = on(&profiles.b, Platform::B);

    let chosen = match rules.merge {
        SubscriptionMerge::PreferPlatformA => best(a.into_iter()).or_else(|| best(b.into_iter())),
        SubscriptionMerge::HighestRank => best(a.into_iter().chain(b)),
    };

    chosen
        .map(|subscription| subscription.name)
        .unwrap_or_else(|| UNKNOWN_SUBSCRIPTION.to_string())
}
