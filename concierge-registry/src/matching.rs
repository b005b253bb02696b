//! Keyword matching used when the backend cannot choose a capability.

use concierge_core::OperationDescriptor;

/// Lowercased alphanumeric words of `text`.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|w| w.trim_matches('\'').to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Number of distinct descriptor keywords appearing as whole words in `tokens`.
pub fn keyword_score(tokens: &[String], descriptor: &OperationDescriptor) -> usize {
    descriptor
        .keywords
        .iter()
        .filter(|keyword| {
            let keyword = keyword.to_lowercase();
            tokens.iter().any(|t| *t == keyword)
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_core::CapabilityId;

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Search my RECENT messages, about invoices!"),
            vec!["search", "my", "recent", "messages", "about", "invoices"]
        );
        assert_eq!(tokenize("what's up"), vec!["what's", "up"]);
    }

    #[test]
    fn test_score_requires_whole_words() {
        let search = OperationDescriptor::standard(CapabilityId::SearchMessages);
        assert_eq!(keyword_score(&tokenize("research papers"), &search), 0);
        assert_eq!(
            keyword_score(&tokenize("search my recent messages about invoices"), &search),
            3
        );
    }

    #[test]
    fn test_repeated_word_counts_once() {
        let events = OperationDescriptor::standard(CapabilityId::ListEvents);
        assert_eq!(keyword_score(&tokenize("calendar calendar calendar"), &events), 1);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use concierge_core::CapabilityId;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// A score never exceeds the keyword count.
        #[test]
        fn prop_score_bounded(text in "[a-zA-Z ,.!?]{0,80}", idx in 0usize..8) {
            let descriptor = OperationDescriptor::standard(CapabilityId::ALL[idx]);
            let score = keyword_score(&tokenize(&text), &descriptor);
            prop_assert!(score <= descriptor.keywords.len());
        }
    }
}
