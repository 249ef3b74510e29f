//! Shared database mapping utilities
//!
//! SQLite 没有原生JSON列类型，标签、约束、模板等结构化字段以JSON文本存储。

use cluster_core::{ClusterError, ClusterResult};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{sqlite::SqliteRow, Row};

pub struct MappingHelpers;

impl MappingHelpers {
    /// 序列化结构化字段为JSON文本
    pub fn to_json<T: Serialize>(value: &T, field_name: &str) -> ClusterResult<String> {
        serde_json::to_string(value)
            .map_err(|e| ClusterError::Serialization(format!("序列化字段 {field_name} 失败: {e}")))
    }

    pub fn to_optional_json<T: Serialize>(
        value: Option<&T>,
        field_name: &str,
    ) -> ClusterResult<Option<String>> {
        value.map(|v| Self::to_json(v, field_name)).transpose()
    }

    /// 从JSON文本列解析结构化字段
    pub fn parse_json<T: DeserializeOwned>(row: &SqliteRow, field_name: &str) -> ClusterResult<T> {
        let json_str: String = row.try_get(field_name)?;
        serde_json::from_str(&json_str)
            .map_err(|e| ClusterError::Serialization(format!("解析字段 {field_name} 失败: {e}")))
    }

    pub fn parse_optional_json<T: DeserializeOwned>(
        row: &SqliteRow,
        field_name: &str,
    ) -> ClusterResult<Option<T>> {
        match row.try_get::<Option<String>, _>(field_name)? {
            Some(json_str) => serde_json::from_str(&json_str).map(Some).map_err(|e| {
                ClusterError::Serialization(format!("解析字段 {field_name} 失败: {e}"))
            }),
            None => Ok(None),
        }
    }

    /// 生成 `?, ?, ?` 形式的占位符列表
    pub fn placeholders(count: usize) -> String {
        vec!["?"; count].join(", ")
    }
}
