//! Turn generated markdown into a structured [`ProposalResult`].

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::{DocumentItem, ImplementationStep, ProposalResult, Resource};

static DIAGRAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```mermaid\s+([\s\S]+?)\s*```").expect("valid mermaid block regex")
});

static STEPS_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^#{2,3}\s*.*(implementation steps|implementation plan|实施步骤).*$")
        .expect("valid steps heading regex")
});

static RESOURCES_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^#{2,3}\s*.*(resources|所需资源).*$").expect("valid resources heading regex")
});

static NUMBERED_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*\d+[.)]\s+(.+)$").expect("valid numbered item regex"));

static BULLET_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*[-*]\s+(.+)$").expect("valid bullet item regex"));

/// Build a result from raw proposal text and the documents it cites
pub fn parse_proposal(text: &str, references: &[DocumentItem]) -> ProposalResult {
    let diagram = DIAGRAM
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    let steps = section(text, &STEPS_HEADING)
        .map(|body| {
            NUMBERED_ITEM
                .captures_iter(body)
                .filter_map(|c| c.get(1))
                .enumerate()
                .map(|(i, m)| ImplementationStep {
                    step: i as u32 + 1,
                    description: m.as_str().trim().to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    let resources = section(text, &RESOURCES_HEADING)
        .map(|body| {
            BULLET_ITEM
                .captures_iter(body)
                .filter_map(|c| c.get(1))
                .map(|m| Resource {
                    kind: "resource".to_string(),
                    description: m.as_str().trim().to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    ProposalResult {
        proposal_text: text.to_string(),
        diagram,
        steps,
        resources,
        references: references.to_vec(),
        translated_topic: None,
    }
}

/// Body of the first section whose heading matches, up to the next `##`
fn section<'a>(text: &'a str, heading: &Regex) -> Option<&'a str> {
    let start = heading.find(text)?.end();
    let rest = &text[start..];
    let end = rest.find("\n##").unwrap_or(rest.len());
    Some(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# Proposal

## Architecture

```mermaid
graph TD
  A --> B
```

## Implementation Steps

1. Collect the corpus
2. Train the ranker
3. Ship it

## Required Resources

- Two GPUs
- A labelled dataset

## Risks

- Not a resource
";

    #[test]
    fn test_parse_full_proposal() {
        let refs = vec![DocumentItem::placeholder("x")];
        let result = parse_proposal(SAMPLE, &refs);

        assert_eq!(result.diagram.as_deref(), Some("graph TD\n  A --> B"));
        assert_eq!(result.steps.len(), 3);
        assert_eq!(result.steps[0].step, 1);
        assert_eq!(result.steps[2].description, "Ship it");
        assert_eq!(result.resources.len(), 2);
        assert_eq!(result.resources[1].description, "A labelled dataset");
        assert_eq!(result.references, refs);
        assert_eq!(result.proposal_text, SAMPLE);
    }

    #[test]
    fn test_parse_chinese_headings() {
        let text = "## 实施步骤\n1. 收集数据\n2. 训练模型\n\n## 所需资源\n- 服务器\n";
        let result = parse_proposal(text, &[]);
        assert_eq!(result.steps.len(), 2);
        assert_eq!(result.resources.len(), 1);
        assert!(result.diagram.is_none());
    }

    #[test]
    fn test_parse_plain_text() {
        let result = parse_proposal("Just prose, no structure.", &[]);
        assert!(result.steps.is_empty());
        assert!(result.resources.is_empty());
        assert!(result.diagram.is_none());
    }
}
