//! Display-name truncation and fallback name generation.

use rand::Rng;

const ANIMALS: &[&str] = &[
    "Aardvark", "Badger", "Beaver", "Bison", "Capybara", "Cheetah", "Coyote", "Crane", "Dingo",
    "Dolphin", "Falcon", "Ferret", "Gazelle", "Gecko", "Heron", "Ibex", "Jackal", "Koala", "Lemur",
    "Lynx", "Marmot", "Meerkat", "Moose", "Narwhal", "Ocelot", "Otter", "Panda", "Pelican",
    "Puffin", "Quokka", "Raccoon", "Salamander", "Stoat", "Tapir", "Toucan", "Vole", "Walrus",
    "Wombat", "Yak", "Zebra",
];

const ADJECTIVES: &[&str] = &[
    "Agile", "Amber", "Bold", "Brave", "Calm", "Clever", "Curious", "Daring", "Eager", "Fancy",
    "Gentle", "Glad", "Happy", "Humble", "Jolly", "Keen", "Lively", "Lucky", "Merry", "Mighty",
    "Nimble", "Noble", "Plucky", "Proud", "Quick", "Quiet", "Rapid", "Silent", "Sleepy", "Spry",
    "Swift", "Tidy", "Vivid", "Witty", "Zany",
];

/// Trim whitespace and cap at `max_chars` characters.
///
/// An over-long name keeps `max_chars - 1` characters followed by `…`.
pub fn truncate_name(raw: &str, max_chars: usize) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Pick a name of at most `max_chars` characters not rejected by
/// `is_taken`.
///
/// Tries a random animal, then a random adjective plus that animal, then the
/// adjective form with `-2`, `-3`, ... appended until one is free. Each
/// candidate is truncated like a user-chosen name; suffixed candidates shorten
/// the stem so the suffix stays inside the cap. Only a suffix that alone
/// fills the cap lets a candidate run over it.
pub fn generate_name<R, F>(rng: &mut R, max_chars: usize, is_taken: F) -> String
where
    R: Rng + ?Sized,
    F: Fn(&str) -> bool,
{
    let animal = ANIMALS[rng.random_range(0..ANIMALS.len())];
    let candidate = truncate_name(animal, max_chars);
    if !is_taken(&candidate) {
        return candidate;
    }

    let adjective = ADJECTIVES[rng.random_range(0..ADJECTIVES.len())];
    let base = format!("{adjective} {animal}");
    let candidate = truncate_name(&base, max_chars);
    if !is_taken(&candidate) {
        return candidate;
    }

    let mut n: u64 = 2;
    loop {
        let suffix = format!("-{n}");
        let stem_chars = max_chars.saturating_sub(suffix.len()).max(1);
        let candidate = format!("{}{suffix}", truncate_name(&base, stem_chars));
        if !is_taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    #[test]
    fn short_names_pass_through_trimmed() {
        assert_eq!(truncate_name("  Alice ", 30), "Alice");
        assert_eq!(truncate_name("", 30), "");
    }

    #[test]
    fn long_names_get_an_ellipsis() {
        let name = truncate_name("abcdefghij", 5);
        assert_eq!(name, "abcd…");
        assert_eq!(name.chars().count(), 5);
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        assert_eq!(truncate_name("ééééé", 5), "ééééé");
        assert_eq!(truncate_name("éééééé", 5), "éééé…");
    }

    #[test]
    fn free_animal_is_used_alone() {
        let mut rng = StdRng::seed_from_u64(1);
        let name = generate_name(&mut rng, 30, |_| false);
        assert!(ANIMALS.contains(&name.as_str()));
    }

    #[test]
    fn taken_animal_gets_an_adjective() {
        let mut rng = StdRng::seed_from_u64(2);
        let name = generate_name(&mut rng, 30, |n| ANIMALS.contains(&n));
        let (adj, animal) = name.split_once(' ').unwrap();
        assert!(ADJECTIVES.contains(&adj));
        assert!(ANIMALS.contains(&animal));
    }

    #[test]
    fn suffixes_count_up_from_two() {
        let mut rng = StdRng::seed_from_u64(3);
        // Everything without a suffix, plus -2 and -3, is taken.
        let name = generate_name(&mut rng, 30, |n| {
            !n.contains('-') || n.ends_with("-2") || n.ends_with("-3")
        });
        assert!(name.ends_with("-4"), "{name}");
    }

    #[test]
    fn repeated_generation_stays_unique() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut taken = HashSet::new();
        for _ in 0..500 {
            let name = generate_name(&mut rng, 30, |n| taken.contains(&n.to_lowercase()));
            assert!(!name.is_empty());
            assert!(taken.insert(name.to_lowercase()));
        }
    }

    #[test]
    fn generated_names_respect_a_small_cap() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut taken = HashSet::new();
        for _ in 0..200 {
            let name = generate_name(&mut rng, 5, |n| taken.contains(&n.to_lowercase()));
            assert!(name.chars().count() <= 5, "{name}");
            assert!(taken.insert(name.to_lowercase()));
        }
    }

    #[test]
    fn suffix_shortens_the_stem() {
        let mut rng = StdRng::seed_from_u64(6);
        let name = generate_name(&mut rng, 8, |n| !n.contains('-'));
        assert!(name.ends_with("-2"), "{name}");
        assert_eq!(name.chars().count(), 8);
    }
}
