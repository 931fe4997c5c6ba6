//! Chapter filename allocation.
//!
//! Every article of a run gets `{index}_{slug}.xhtml`, numbered from 1 in
//! section-major, article-minor order. The ToC assembler walks the groups
//! in the same order, so numbering here is the single source of truth for
//! chapter order.

use crate::models::SectionGroup;
use crate::utils::slugify_title;
use std::collections::HashMap;

/// Mapping from article URL to its chapter filename.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlToFileMap {
    files: HashMap<String, String>,
    ordered: Vec<String>,
}

impl UrlToFileMap {
    pub fn get(&self, web_url: &str) -> Option<&str> {
        self.files.get(web_url).map(String::as_str)
    }

    pub fn contains(&self, web_url: &str) -> bool {
        self.files.contains_key(web_url)
    }

    /// Filenames in traversal order, one per article, duplicates included.
    pub fn ordered(&self) -> &[String] {
        &self.ordered
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

/// Assign every article across `groups` a unique chapter filename.
///
/// Pure and infallible. A URL that shows up twice still consumes an index
/// and gets its own chapter; links to it resolve to the first occurrence.
///
/// # Arguments
///
/// * `groups` - Sections in reading order, articles in source order
///
/// # Returns
///
/// A map from article URL to `<index>_<slug>.xhtml`, with indices counting
/// from 1 across all sections. Filenames are also kept in allocation order.
pub fn allocate_filenames(groups: &[SectionGroup]) -> UrlToFileMap {
    let mut files = HashMap::new();
    let mut ordered = Vec::new();
    let articles = groups.iter().flat_map(|group| group.articles.iter());
    for (i, article) in articles.enumerate() {
        let filename = format!("{}_{}.xhtml", i + 1, slugify_title(&article.web_title));
        files
            .entry(article.web_url.clone())
            .or_insert_with(|| filename.clone());
        ordered.push(filename);
    }
    UrlToFileMap { files, ordered }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Article;
    use regex::Regex;
    use std::collections::HashSet;

    fn article(url: &str, title: &str) -> Article {
        Article {
            web_url: url.to_string(),
            web_title: title.to_string(),
            ..Default::default()
        }
    }

    fn sample_groups() -> Vec<SectionGroup> {
        vec![
            SectionGroup::new(
                "news",
                vec![
                    article("https://www.theguardian.com/a", "First Story"),
                    article("https://www.theguardian.com/b", "Second: story!"),
                ],
            ),
            SectionGroup::new("sport", vec![article("https://www.theguardian.com/c", "日本")]),
        ]
    }

    #[test]
    fn test_numbering_follows_traversal_order() {
        let map = allocate_filenames(&sample_groups());
        assert_eq!(map.len(), 3);
        assert_eq!(map.get("https://www.theguardian.com/a"), Some("1_first-story.xhtml"));
        assert_eq!(map.get("https://www.theguardian.com/b"), Some("2_second-story.xhtml"));
        assert_eq!(map.get("https://www.theguardian.com/c"), Some("3_.xhtml"));
    }

    #[test]
    fn test_filenames_unique_and_well_formed() {
        let pattern = Regex::new(r"^\d+_[a-z0-9-]*\.xhtml$").unwrap();
        let groups = vec![SectionGroup::new(
            "news",
            (0..50)
                .map(|i| article(&format!("https://www.theguardian.com/{i}"), "Same Title"))
                .collect(),
        )];
        let map = allocate_filenames(&groups);

        let names: HashSet<&str> = map.ordered().iter().map(String::as_str).collect();
        assert_eq!(names.len(), 50);
        assert!(names.iter().all(|name| pattern.is_match(name)));

        let mut prefixes: Vec<usize> = names
            .iter()
            .map(|name| name.split('_').next().unwrap().parse().unwrap())
            .collect();
        prefixes.sort_unstable();
        assert_eq!(prefixes, (1..=50).collect::<Vec<_>>());
    }

    #[test]
    fn test_section_permutation_changes_numbering() {
        let mut groups = sample_groups();
        groups.reverse();
        let map = allocate_filenames(&groups);
        assert_eq!(map.get("https://www.theguardian.com/c"), Some("1_.xhtml"));
        assert_eq!(map.get("https://www.theguardian.com/a"), Some("2_first-story.xhtml"));
    }

    #[test]
    fn test_duplicate_url_keeps_distinct_chapters() {
        let groups = vec![
            SectionGroup::new("news", vec![article("https://www.theguardian.com/x", "Shared")]),
            SectionGroup::new("world", vec![article("https://www.theguardian.com/x", "Shared")]),
        ];
        let map = allocate_filenames(&groups);
        assert_eq!(map.ordered(), ["1_shared.xhtml", "2_shared.xhtml"]);
        assert_eq!(map.get("https://www.theguardian.com/x"), Some("1_shared.xhtml"));
    }

    #[test]
    fn test_empty_input() {
        assert!(allocate_filenames(&[]).is_empty());
    }
}
