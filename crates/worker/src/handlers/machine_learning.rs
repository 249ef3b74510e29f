use async_trait::async_trait;
use cluster_core::{ClusterError, ClusterResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::handler::{JobContext, JobHandler};

/// 线性回归训练参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionParams {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

/// 机器学习处理器：最小二乘拟合一元线性模型
pub struct MachineLearningHandler;

impl MachineLearningHandler {
    pub fn fit(params: &RegressionParams) -> ClusterResult<Value> {
        let (xs, ys) = (&params.x, &params.y);
        if xs.len() != ys.len() {
            return Err(ClusterError::JobExecution(format!(
                "样本长度不一致: x={}, y={}",
                xs.len(),
                ys.len()
            )));
        }
        if xs.len() < 2 {
            return Err(ClusterError::JobExecution(
                "至少需要两个样本".to_string(),
            ));
        }

        let n = xs.len() as f64;
        let mean_x = xs.iter().sum::<f64>() / n;
        let mean_y = ys.iter().sum::<f64>() / n;

        let mut sxx = 0.0;
        let mut sxy = 0.0;
        for (x, y) in xs.iter().zip(ys) {
            sxx += (x - mean_x) * (x - mean_x);
            sxy += (x - mean_x) * (y - mean_y);
        }
        if sxx == 0.0 {
            return Err(ClusterError::JobExecution(
                "x 方差为0，无法拟合".to_string(),
            ));
        }

        let slope = sxy / sxx;
        let intercept = mean_y - slope * mean_x;

        let mut ss_res = 0.0;
        let mut ss_tot = 0.0;
        for (x, y) in xs.iter().zip(ys) {
            let predicted = slope * x + intercept;
            ss_res += (y - predicted) * (y - predicted);
            ss_tot += (y - mean_y) * (y - mean_y);
        }
        let r_squared = if ss_tot == 0.0 { 1.0 } else { 1.0 - ss_res / ss_tot };

        Ok(json!({
            "model": "linear_regression",
            "samples": xs.len(),
            "slope": slope,
            "intercept": intercept,
            "rSquared": r_squared,
            "mse": ss_res / n,
        }))
    }
}

#[async_trait]
impl JobHandler for MachineLearningHandler {
    fn job_type(&self) -> &str {
        "machine_learning"
    }

    async fn execute(&self, context: &JobContext) -> ClusterResult<Value> {
        let params: RegressionParams = context.params()?;
        Self::fit(&params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_exact_line() {
        let params = RegressionParams {
            x: vec![0.0, 1.0, 2.0, 3.0],
            y: vec![1.0, 3.0, 5.0, 7.0],
        };
        let output = MachineLearningHandler::fit(&params).unwrap();
        assert!((output["slope"].as_f64().unwrap() - 2.0).abs() < 1e-9);
        assert!((output["intercept"].as_f64().unwrap() - 1.0).abs() < 1e-9);
        assert!((output["rSquared"].as_f64().unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(output["samples"], json!(4));
    }

    #[test]
    fn test_fit_rejects_bad_input() {
        let mismatched = RegressionParams {
            x: vec![1.0, 2.0],
            y: vec![1.0],
        };
        assert!(MachineLearningHandler::fit(&mismatched).is_err());

        let constant_x = RegressionParams {
            x: vec![2.0, 2.0, 2.0],
            y: vec![1.0, 2.0, 3.0],
        };
        assert!(MachineLearningHandler::fit(&constant_x).is_err());
    }
}
