//! 领域输出契约
//!
//! 选股流程的两个结构化契约：候选公司列表与公司研究列表。
//! 最终决策任务不声明 Schema，接受自由文本报告。

use crate::schema::{FieldType, Schema, SchemaField};

/// candidate_list：{companies: [{name, ticker, reason}]}
pub fn candidate_list_schema() -> Schema {
    let company = Schema::new("trending_company")
        .field(SchemaField::required("name", FieldType::Text, "Company name"))
        .field(SchemaField::required(
            "ticker",
            FieldType::Text,
            "Stock ticker symbol (e.g. AAPL, MSFT)",
        ))
        .field(SchemaField::required(
            "reason",
            FieldType::Text,
            "Why the company is trending in the news",
        ));

    Schema::new("candidate_list").field(SchemaField::required(
        "companies",
        FieldType::Array(Box::new(FieldType::Object(company))),
        "Companies currently trending in the news",
    ))
}

/// research_list：{research_list: [{name, market_position, future_outlook, investment_potential}]}
pub fn research_list_schema() -> Schema {
    let research = Schema::new("company_research")
        .field(SchemaField::required("name", FieldType::Text, "Company name"))
        .field(SchemaField::required(
            "market_position",
            FieldType::Text,
            "Current market position and competitive analysis",
        ))
        .field(SchemaField::required(
            "future_outlook",
            FieldType::Text,
            "Growth prospects and future outlook",
        ))
        .field(SchemaField::required(
            "investment_potential",
            FieldType::Text,
            "Investment potential and suitability",
        ));

    Schema::new("research_list").field(SchemaField::required(
        "research_list",
        FieldType::Array(Box::new(FieldType::Object(research))),
        "Comprehensive research on every trending company",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_candidate_list_accepts_valid() {
        let schema = candidate_list_schema();
        let value = json!({
            "companies": [
                {"name": "Acme", "ticker": "ACM", "reason": "earnings beat"}
            ]
        });
        assert!(schema.check(&value).is_ok());
    }

    #[test]
    fn test_candidate_list_rejects_missing_ticker() {
        let schema = candidate_list_schema();
        let value = json!({"companies": [{"name": "Acme", "reason": "earnings beat"}]});
        let err = schema.check(&value).unwrap_err();
        assert!(err.contains("ticker"));
    }

    #[test]
    fn test_research_list_accepts_valid() {
        let schema = research_list_schema();
        let value = json!({
            "research_list": [{
                "name": "Acme",
                "market_position": "leader",
                "future_outlook": "strong",
                "investment_potential": "high"
            }]
        });
        assert!(schema.check(&value).is_ok());
    }
}
