/// Name collation for the deployment locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collator {
    Thai,
    Generic,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CollationKey {
    primary: Vec<char>,
    secondary: Vec<char>,
    raw: String,
}

const THAI_LEADING_VOWELS: std::ops::RangeInclusive<char> = '\u{0E40}'..='\u{0E44}';
const THAI_CONSONANTS: std::ops::RangeInclusive<char> = '\u{0E01}'..='\u{0E2E}';
// Maitaikhu, tone marks, thanthakhat, nikhahit, yamakkan.
const THAI_IGNORABLE: std::ops::RangeInclusive<char> = '\u{0E47}'..='\u{0E4E}';

impl Collator {
    pub fn for_locale(locale: &str) -> Self {
        let lang = locale
            .split(['-', '_'])
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        match lang.as_str() {
            "th" => Collator::Thai,
            _ => Collator::Generic,
        }
    }

    pub fn key(&self, s: &str) -> CollationKey {
        let folded: Vec<char> = s.trim().chars().flat_map(char::to_lowercase).collect();
        match self {
            Collator::Generic => CollationKey {
                primary: folded.clone(),
                secondary: folded,
                raw: s.to_string(),
            },
            Collator::Thai => {
                let reordered = reorder_leading_vowels(&folded);
                CollationKey {
                    primary: reordered
                        .iter()
                        .copied()
                        .filter(|c| !THAI_IGNORABLE.contains(c))
                        .collect(),
                    secondary: reordered,
                    raw: s.to_string(),
                }
            }
        }
    }
}

/// Thai leading vowels are written before the consonant they follow phonetically;
/// dictionary order sorts by the consonant first.
fn reorder_leading_vowels(chars: &[char]) -> Vec<char> {
    let mut out = Vec::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if THAI_LEADING_VOWELS.contains(&c)
            && i + 1 < chars.len()
            && THAI_CONSONANTS.contains(&chars[i + 1])
        {
            out.push(chars[i + 1]);
            out.push(c);
            i += 2;
        } else {
            out.push(c);
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    fn compare(c: Collator, a: &str, b: &str) -> Ordering {
        c.key(a).cmp(&c.key(b))
    }

    #[test]
    fn locale_tags_select_collator() {
        assert_eq!(Collator::for_locale("th"), Collator::Thai);
        assert_eq!(Collator::for_locale("th-TH"), Collator::Thai);
        assert_eq!(Collator::for_locale("TH_th"), Collator::Thai);
        assert_eq!(Collator::for_locale("en"), Collator::Generic);
        assert_eq!(Collator::for_locale(""), Collator::Generic);
    }

    #[test]
    fn thai_leading_vowel_sorts_by_consonant() {
        let c = Collator::Thai;
        // เก (e + ko kai) sorts with ko kai, before ขา (kho khai).
        assert_eq!(compare(c, "เก", "ขา"), Ordering::Less);
        // Code point order would put เก after every consonant.
        assert_eq!("เก".cmp("ขา"), Ordering::Greater);
    }

    #[test]
    fn thai_tone_marks_only_break_ties() {
        let c = Collator::Thai;
        assert_eq!(compare(c, "ก่า", "กาข"), Ordering::Less);
        assert_ne!(compare(c, "ก่า", "กา"), Ordering::Equal);
    }

    #[test]
    fn generic_is_case_insensitive_first() {
        let c = Collator::Generic;
        assert_eq!(compare(c, "alice", "Bob"), Ordering::Less);
        assert_eq!(compare(c, "Bob", "bob"), Ordering::Less);
        assert_eq!(compare(c, "bob", "bob"), Ordering::Equal);
    }
}
