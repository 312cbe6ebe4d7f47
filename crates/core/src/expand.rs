//! Batch expansion: raw facts → the three relational fact lists.

use crate::model::{FactGroup, LinkFact, PrefixOriginFact, PrefixPathFact, RawFact};

/// Expand a batch of raw facts into one [`FactGroup`].
///
/// Every fact contributes a prefix/origin row; announcements additionally
/// contribute one link per adjacent hop pair and one prefix/member row per
/// hop. All rows carry `count = 1` and the fact's own timestamp.
pub fn expand(facts: &[RawFact]) -> FactGroup {
    let mut group = FactGroup {
        prefix_origins: Vec::with_capacity(facts.len()),
        source_facts: facts.len(),
        ..FactGroup::default()
    };

    for fact in facts {
        group.prefix_origins.push(PrefixOriginFact {
            range: fact.range.clone(),
            origin: fact.origin,
            count: 1,
            last_update: fact.timestamp,
        });

        group.links.extend(fact.path.windows(2).map(|pair| LinkFact {
            from: pair[0],
            to: pair[1],
            count: 1,
            last_update: fact.timestamp,
        }));

        group.prefix_paths.extend(fact.path.iter().map(|&member| PrefixPathFact {
            range: fact.range.clone(),
            member,
            count: 1,
            last_update: fact.timestamp,
        }));
    }
    group
}
