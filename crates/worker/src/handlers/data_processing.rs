use std::collections::BTreeMap;

use async_trait::async_trait;
use cluster_core::ClusterResult;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::handler::{JobContext, JobHandler};

/// 数据处理作业参数
///
/// `records` 可以是数字数组，也可以是对象数组配合 `field` 取值。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataProcessingParams {
    pub records: Vec<Value>,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub group_by: Option<String>,
}

#[derive(Debug, Default)]
struct Aggregate {
    count: usize,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
}

impl Aggregate {
    fn add(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }

    fn to_json(&self) -> Value {
        let mean = (self.count > 0).then(|| self.sum / self.count as f64);
        json!({
            "count": self.count,
            "sum": self.sum,
            "mean": mean,
            "min": self.min,
            "max": self.max,
        })
    }
}

/// 数据处理处理器：对记录做数值聚合，可按字段分组
pub struct DataProcessingHandler;

impl DataProcessingHandler {
    fn extract(record: &Value, field: Option<&str>) -> Option<f64> {
        match field {
            Some(field) => record.get(field).and_then(Value::as_f64),
            None => record.as_f64(),
        }
    }

    fn group_key(record: &Value, group_by: &str) -> String {
        match record.get(group_by) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => "null".to_string(),
            Some(other) => other.to_string(),
        }
    }

    pub fn aggregate(params: &DataProcessingParams) -> Value {
        let field = params.field.as_deref();
        let mut total = Aggregate::default();
        let mut groups: BTreeMap<String, Aggregate> = BTreeMap::new();
        let mut skipped = 0usize;

        for record in &params.records {
            let Some(value) = Self::extract(record, field) else {
                skipped += 1;
                continue;
            };
            total.add(value);
            if let Some(group_by) = params.group_by.as_deref() {
                groups
                    .entry(Self::group_key(record, group_by))
                    .or_default()
                    .add(value);
            }
        }

        let mut output = total.to_json();
        output["skipped"] = json!(skipped);
        if params.group_by.is_some() {
            let groups: serde_json::Map<String, Value> = groups
                .iter()
                .map(|(key, agg)| (key.clone(), agg.to_json()))
                .collect();
            output["groups"] = Value::Object(groups);
        }
        output
    }
}

#[async_trait]
impl JobHandler for DataProcessingHandler {
    fn job_type(&self) -> &str {
        "data_processing"
    }

    async fn execute(&self, context: &JobContext) -> ClusterResult<Value> {
        let params: DataProcessingParams = context.params()?;
        Ok(Self::aggregate(&params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_plain_numbers() {
        let params = DataProcessingParams {
            records: vec![json!(1), json!(2.5), json!("x"), json!(4)],
            field: None,
            group_by: None,
        };
        let output = DataProcessingHandler::aggregate(&params);
        assert_eq!(output["count"], json!(3));
        assert_eq!(output["sum"], json!(7.5));
        assert_eq!(output["min"], json!(1.0));
        assert_eq!(output["max"], json!(4.0));
        assert_eq!(output["skipped"], json!(1));
        assert!(output.get("groups").is_none());
    }

    #[test]
    fn test_aggregate_grouped_records() {
        let params = DataProcessingParams {
            records: vec![
                json!({"region": "east", "amount": 10}),
                json!({"region": "west", "amount": 4}),
                json!({"region": "east", "amount": 20}),
                json!({"region": "west"}),
            ],
            field: Some("amount".to_string()),
            group_by: Some("region".to_string()),
        };
        let output = DataProcessingHandler::aggregate(&params);
        assert_eq!(output["count"], json!(3));
        assert_eq!(output["groups"]["east"]["mean"], json!(15.0));
        assert_eq!(output["groups"]["west"]["count"], json!(1));
        assert_eq!(output["skipped"], json!(1));
    }

    #[test]
    fn test_empty_records_have_no_mean() {
        let params = DataProcessingParams {
            records: vec![],
            field: None,
            group_by: None,
        };
        let output = DataProcessingHandler::aggregate(&params);
        assert_eq!(output["count"], json!(0));
        assert!(output["mean"].is_null());
    }
}
