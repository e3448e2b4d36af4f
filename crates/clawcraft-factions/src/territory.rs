//! Territory placement.
//!
//! Territories are circles on the X/Z plane. A new claim samples random
//! centers inside `[-extent, extent]` on both axes and accepts the first
//! one whose circle does not overlap any existing territory.

use std::collections::BTreeMap;

use rand::Rng;

use clawcraft_types::{FactionName, Territory, TerritoryId};

/// Whether two circles overlap. Touching circles do not.
pub fn overlaps(ax: i64, az: i64, ar: u32, bx: i64, bz: i64, br: u32) -> bool {
    let dx = i128::from(ax).saturating_sub(i128::from(bx));
    let dz = i128::from(az).saturating_sub(i128::from(bz));
    let distance_sq = dx.saturating_mul(dx).saturating_add(dz.saturating_mul(dz));
    let reach = i128::from(ar).saturating_add(i128::from(br));
    distance_sq < reach.saturating_mul(reach)
}

/// Sample up to `attempts` centers and return the first free one.
pub fn find_free_center<'a>(
    existing: impl Iterator<Item = &'a Territory> + Clone,
    radius: u32,
    extent: i64,
    attempts: u32,
    rng: &mut impl Rng,
) -> Option<(i64, i64)> {
    let extent = extent.max(0);
    for _ in 0..attempts {
        let x = rng.random_range(-extent..=extent);
        let z = rng.random_range(-extent..=extent);
        let clear = existing
            .clone()
            .all(|t| !overlaps(x, z, radius, t.center_x, t.center_z, t.radius));
        if clear {
            return Some((x, z));
        }
    }
    None
}

/// Lowercase slug of a faction name, e.g. `Iron Brotherhood` -> `iron_brotherhood`.
pub fn slug(name: &FactionName) -> String {
    name.as_str()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// A territory id derived from `base` that is not yet taken.
pub(crate) fn unique_id(base: String, taken: &BTreeMap<TerritoryId, Territory>) -> TerritoryId {
    let candidate = TerritoryId::new(base.clone());
    if !taken.contains_key(&candidate) {
        return candidate;
    }
    let mut n: u32 = 2;
    loop {
        let candidate = TerritoryId::new(format!("{base}_{n}"));
        if !taken.contains_key(&candidate) {
            return candidate;
        }
        n = n.saturating_add(1);
    }
}

/// A freshly claimed home territory with the starting stockpile.
pub(crate) fn home_territory(
    id: TerritoryId,
    faction: FactionName,
    (center_x, center_z): (i64, i64),
    radius: u32,
) -> Territory {
    Territory {
        id,
        faction,
        center_x,
        center_z,
        radius,
        resources: BTreeMap::from([
            ("stone".to_owned(), 100),
            ("wood".to_owned(), 50),
            ("iron".to_owned(), 20),
        ]),
        structures: vec!["faction_hall".to_owned()],
        defense_level: 1,
        last_contested: None,
    }
}

/// An outpost: same footprint as a home territory but nothing built yet.
pub(crate) fn outpost(
    id: TerritoryId,
    faction: FactionName,
    (center_x, center_z): (i64, i64),
    radius: u32,
) -> Territory {
    Territory {
        id,
        faction,
        center_x,
        center_z,
        radius,
        resources: BTreeMap::new(),
        structures: Vec::new(),
        defense_level: 1,
        last_contested: None,
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    fn at(id: &str, x: i64, z: i64) -> Territory {
        home_territory(TerritoryId::from(id), FactionName::from("f"), (x, z), 50)
    }

    #[test]
    fn overlap_is_strict() {
        assert!(overlaps(0, 0, 50, 99, 0, 50));
        assert!(!overlaps(0, 0, 50, 100, 0, 50));
        assert!(!overlaps(0, 0, 50, 80, 80, 50));
    }

    #[test]
    fn free_center_avoids_existing() {
        let existing = [at("a", 0, 0), at("b", 300, 300)];
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..50 {
            let center = find_free_center(existing.iter(), 50, 1000, 64, &mut rng);
            assert!(center.is_some_and(|(x, z)| {
                existing
                    .iter()
                    .all(|t| !overlaps(x, z, 50, t.center_x, t.center_z, t.radius))
            }));
        }
    }

    #[test]
    fn crowded_world_gives_up() {
        let existing = [at("a", 0, 0)];
        let mut rng = SmallRng::seed_from_u64(1);
        assert_eq!(find_free_center(existing.iter(), 50, 10, 64, &mut rng), None);
    }

    #[test]
    fn slug_and_unique_id() {
        let name = FactionName::from("Iron Brotherhood");
        assert_eq!(slug(&name), "iron_brotherhood");

        let mut taken = BTreeMap::new();
        taken.insert(TerritoryId::from("x_home"), at("x_home", 0, 0));
        assert_eq!(unique_id("x_home".to_owned(), &taken).as_str(), "x_home_2");
        assert_eq!(unique_id("y_home".to_owned(), &taken).as_str(), "y_home");
    }

    #[test]
    fn home_territory_has_starting_stockpile() {
        let t = at("h", 0, 0);
        assert_eq!(t.resources.get("stone"), Some(&100));
        assert_eq!(t.structures, vec!["faction_hall".to_owned()]);
        assert_eq!(t.defense_level, 1);
    }
}
