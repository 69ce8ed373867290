use std::collections::BTreeMap;

use regex::Regex;

pub const UNCATEGORIZED: &str = "uncategorized";

const DEFAULT_TAXONOMY: &[(&str, &[&str])] = &[
    ("AI/ML", &["ai", "machine learning", "ml", "llm", "generative ai", "bedrock", "sagemaker"]),
    ("Compute", &["ec2", "lambda", "serverless", "container", "containers", "kubernetes", "ecs", "eks", "fargate"]),
    ("Storage", &["s3", "storage", "ebs", "efs", "glacier", "backup"]),
    ("Database", &["database", "dynamodb", "rds", "aurora", "postgresql", "mysql", "sql"]),
    ("Networking", &["vpc", "cdn", "cloudfront", "dns", "route 53", "load balancer"]),
    ("Security", &["security", "iam", "encryption", "vulnerability", "kms", "waf"]),
    ("Analytics", &["analytics", "athena", "redshift", "glue", "kinesis", "data lake"]),
    ("DevOps", &["devops", "ci/cd", "terraform", "cloudformation", "cdk", "observability", "monitoring"]),
];

/// Keyword classifier: a category applies when any of its synonyms occurs in
/// the text as a whole word, ignoring case.
pub struct Classifier {
    categories: Vec<(String, Regex)>,
}

impl Classifier {
    pub fn new(taxonomy: &BTreeMap<String, Vec<String>>) -> Self {
        if taxonomy.is_empty() {
            return Self::default();
        }
        Self::build(
            taxonomy
                .iter()
                .map(|(name, words)| {
                    (name.as_str(), words.iter().map(String::as_str).collect::<Vec<_>>())
                }),
        )
    }

    fn build<'a>(taxonomy: impl Iterator<Item = (&'a str, Vec<&'a str>)>) -> Self {
        let categories = taxonomy
            .filter_map(|(name, words)| {
                let alternatives: Vec<String> = words
                    .iter()
                    .map(|w| w.trim())
                    .filter(|w| !w.is_empty())
                    .map(regex::escape)
                    .collect();
                if alternatives.is_empty() {
                    return None;
                }
                let pattern = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));
                match Regex::new(&pattern) {
                    Ok(re) => Some((name.to_string(), re)),
                    Err(e) => {
                        tracing::warn!("skip category {}: {}", name, e);
                        None
                    }
                }
            })
            .collect();
        Self { categories }
    }

    pub fn classify(&self, text: &str) -> Vec<String> {
        let matched: Vec<String> = self
            .categories
            .iter()
            .filter(|(_, re)| re.is_match(text))
            .map(|(name, _)| name.clone())
            .collect();

        if matched.is_empty() {
            vec![UNCATEGORIZED.to_string()]
        } else {
            matched
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::build(
            DEFAULT_TAXONOMY
                .iter()
                .map(|(name, words)| (*name, words.to_vec())),
        )
    }
}
