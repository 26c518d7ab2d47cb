//! Prompt construction for thread analysis.

use std::fmt;

use crate::models::ThreadContext;

/// Community categories that get a specialized analysis focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Tech,
    Gaming,
    Finance,
    Science,
    Politics,
    General,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Tech => "tech",
            Category::Gaming => "gaming",
            Category::Finance => "finance",
            Category::Science => "science",
            Category::Politics => "politics",
            Category::General => "general",
        }
    }

    fn focus(&self) -> &'static str {
        match self {
            Category::Tech => {
                "You are an expert analyst of technology communities. Focus on:\n\
                 - Technical accuracy of the claims made\n\
                 - Tools, libraries and frameworks mentioned\n\
                 - Best practices and anti-patterns discussed\n\
                 - Concrete solutions proposed by the community\n\
                 - Links to documentation, repositories and tutorials"
            }
            Category::Gaming => {
                "You are an expert analyst of gaming communities. Focus on:\n\
                 - Player opinions about gameplay, mechanics and balance\n\
                 - Comparisons with other games\n\
                 - Bugs, patches and updates mentioned\n\
                 - Community expectations and frustrations\n\
                 - Guides, builds and strategies shared"
            }
            Category::Finance => {
                "You are an expert analyst of finance and investing communities. Focus on:\n\
                 - Market sentiment (bullish or bearish)\n\
                 - Assets, tickers and instruments mentioned\n\
                 - Risks and warnings raised by participants\n\
                 - Speculation versus fundamental analysis\n\
                 - Sources of financial data and news cited\n\
                 Never present anything as financial advice."
            }
            Category::Science => {
                "You are an expert analyst of science communities. Focus on:\n\
                 - Accuracy of the scientific claims\n\
                 - Papers, studies and sources cited\n\
                 - Areas of consensus versus open questions\n\
                 - Misconceptions corrected by the community\n\
                 - The level of expertise shown by participants"
            }
            Category::Politics => {
                "You are a neutral analyst of political discussion communities. Focus on:\n\
                 - The positions represented, described without taking sides\n\
                 - The arguments offered for each position\n\
                 - Sources and news outlets cited\n\
                 - The degree of polarization in the discussion\n\
                 Stay strictly impartial."
            }
            Category::General => {
                "You are an expert analyst of online discussion communities. Focus on:\n\
                 - The main topics discussed\n\
                 - The overall tone of the conversation\n\
                 - Points of agreement and disagreement\n\
                 - Links and resources shared\n\
                 - Community dynamics"
            }
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Community names per category, checked in table order.
const CATEGORY_TABLE: &[(Category, &[&str])] = &[
    (
        Category::Tech,
        &[
            "programming",
            "technology",
            "webdev",
            "python",
            "javascript",
            "rust",
            "golang",
            "java",
            "cpp",
            "machinelearning",
            "datascience",
            "devops",
            "linux",
            "apple",
            "android",
            "software",
            "coding",
            "learnprogramming",
        ],
    ),
    (
        Category::Gaming,
        &[
            "gaming",
            "games",
            "pcgaming",
            "ps5",
            "xbox",
            "nintendo",
            "steam",
            "valorant",
            "leagueoflegends",
            "minecraft",
            "fortnite",
            "overwatch",
        ],
    ),
    (
        Category::Finance,
        &[
            "wallstreetbets",
            "stocks",
            "investing",
            "cryptocurrency",
            "bitcoin",
            "ethereum",
            "personalfinance",
            "financialindependence",
            "economics",
        ],
    ),
    (
        Category::Science,
        &[
            "science",
            "askscience",
            "space",
            "physics",
            "biology",
            "chemistry",
            "astronomy",
            "medicine",
            "neuroscience",
            "environment",
        ],
    ),
    (
        Category::Politics,
        &[
            "politics",
            "worldnews",
            "news",
            "uspolitics",
            "geopolitics",
            "conservative",
            "liberal",
            "democrat",
            "republican",
        ],
    ),
];

/// Infer the category of a community: exact match first, then substring
/// match in either direction, both in table order.
pub fn detect_category(subreddit: &str) -> Category {
    let name = subreddit.trim().to_lowercase();
    if name.is_empty() {
        return Category::General;
    }

    for (category, names) in CATEGORY_TABLE {
        if names.contains(&name.as_str()) {
            return *category;
        }
    }

    for (category, names) in CATEGORY_TABLE {
        if names
            .iter()
            .any(|n| name.contains(n) || n.contains(name.as_str()))
        {
            return *category;
        }
    }

    Category::General
}

const OUTPUT_TEMPLATE: &str = r#"{
  "summary_post": "Executive summary of the post (2-4 sentences)",
  "summary_comments": "Summary of the discussion in the comments (4-8 sentences)",
  "sentiment_post": {
    "label": "Positive/Negative/Neutral/Mixed/Controversial",
    "score": 0.75,
    "details": "Briefly explain the dominant tone of the post"
  },
  "sentiment_comments": {
    "label": "Positive/Negative/Neutral/Mixed/Controversial",
    "score": 0.60,
    "details": "Briefly explain the dominant tone of the comments"
  },
  "consensus": "Describe whether there is agreement, disagreement or divided positions",
  "key_controversies": [
    "A concrete point of disagreement",
    "Another contested topic"
  ],
  "useful_links": [
    {
      "url": "https://...",
      "type": "Doc/News/Tool/Reference/GitHub/Video/Article",
      "context": "Who mentions it or in what context"
    }
  ]
}"#;

/// System prompt for a community, including the required output shape.
pub fn system_prompt(subreddit: &str) -> String {
    let category = detect_category(subreddit);
    format!(
        "{focus}\n\n\
         You will receive:\n\
         - The title and text of the post\n\
         - A serialized summary of the comments (nested replies indented with >)\n\n\
         You MUST ALWAYS return VALID JSON with exactly this structure:\n\n\
         {template}\n\n\
         IMPORTANT RULES:\n\
         - If there is NO clear consensus, say so explicitly.\n\
         - Do not invent facts that do not appear in the text.\n\
         - If there are no useful links, return \"useful_links\": [].\n\
         - The JSON must be the only output (no text outside the braces).\n\
         - Scores must be between 0.0 and 1.0 (e.g. 0.75 = 75% positive).\n",
        focus = category.focus(),
        template = OUTPUT_TEMPLATE,
    )
}

/// User prompt carrying the thread content.
pub fn user_prompt(ctx: &ThreadContext) -> String {
    let body = if ctx.body.trim().is_empty() {
        "(no text, title only)"
    } else {
        ctx.body.as_str()
    };
    let comments = if ctx.comments.trim().is_empty() {
        "(no comments)"
    } else {
        ctx.comments.as_str()
    };
    let urls = if ctx.metadata.urls_detected.is_empty() {
        "No URLs detected".to_string()
    } else {
        ctx.metadata
            .urls_detected
            .iter()
            .map(|u| format!("- {u}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "POST TITLE:\n{title}\n\n\
         POST TEXT:\n{body}\n\n\
         SERIALIZED COMMENTS:\n{comments}\n\n\
         URLS DETECTED IN THE THREAD:\n{urls}\n\n\
         Analyze this thread and return ONLY the JSON with the specified structure.",
        title = ctx.title,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::make_test_context;

    #[test]
    fn exact_match() {
        assert_eq!(detect_category("rust"), Category::Tech);
        assert_eq!(detect_category("Minecraft"), Category::Gaming);
        assert_eq!(detect_category("wallstreetbets"), Category::Finance);
        assert_eq!(detect_category("askscience"), Category::Science);
        assert_eq!(detect_category("worldnews"), Category::Politics);
    }

    #[test]
    fn substring_match_either_direction() {
        assert_eq!(detect_category("rustlang"), Category::Tech);
        assert_eq!(detect_category("stocksandbonds"), Category::Finance);
        assert_eq!(detect_category("physic"), Category::Science);
    }

    #[test]
    fn substring_match_follows_table_order() {
        assert_eq!(detect_category("applesauce"), Category::Tech);
        assert_eq!(detect_category("spacex"), Category::Science);
    }

    #[test]
    fn unknown_and_empty_are_general() {
        assert_eq!(detect_category("knitting"), Category::General);
        assert_eq!(detect_category(""), Category::General);
        assert_eq!(detect_category("   "), Category::General);
    }

    #[test]
    fn system_prompt_carries_focus_and_rules() {
        let prompt = system_prompt("rust");
        assert!(prompt.contains("technology communities"));
        assert!(prompt.contains("\"useful_links\": []"));
        assert!(prompt.contains("\"summary_post\""));
        assert!(system_prompt("knitting").contains("online discussion communities"));
    }

    #[test]
    fn user_prompt_defaults_for_empty_sections() {
        let mut ctx = make_test_context();
        ctx.body.clear();
        ctx.comments.clear();
        ctx.metadata.urls_detected.clear();

        let prompt = user_prompt(&ctx);
        assert!(prompt.contains(&ctx.title));
        assert!(prompt.contains("(no text, title only)"));
        assert!(prompt.contains("(no comments)"));
        assert!(prompt.contains("No URLs detected"));
    }

    #[test]
    fn user_prompt_lists_detected_urls() {
        let mut ctx = make_test_context();
        ctx.metadata.urls_detected = vec!["https://docs.rs".into(), "https://crates.io".into()];

        let prompt = user_prompt(&ctx);
        assert!(prompt.contains("- https://docs.rs\n- https://crates.io"));
        assert!(prompt.contains(&ctx.comments));
    }
}
