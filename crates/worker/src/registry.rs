use std::collections::HashMap;
use std::sync::Arc;

use crate::handler::JobHandler;
use crate::handlers::{
    BatchComputationHandler, DataProcessingHandler, GenericHandler, MachineLearningHandler,
    GENERIC_JOB_TYPE,
};

/// 作业类型到处理器的映射，未知类型回退到通用处理器
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
    fallback: Arc<dyn JobHandler>,
}

impl HandlerRegistry {
    /// 只包含通用处理器的空注册表
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Arc::new(GenericHandler),
        }
    }

    /// 注册全部内置处理器
    pub fn with_builtin_handlers() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(DataProcessingHandler));
        registry.register(Arc::new(MachineLearningHandler));
        registry.register(Arc::new(BatchComputationHandler));
        registry.register(Arc::new(GenericHandler));
        registry
    }

    /// 注册处理器，同类型的旧处理器会被替换
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        let job_type = handler.job_type().to_string();
        if job_type == GENERIC_JOB_TYPE {
            self.fallback = handler.clone();
        }
        self.handlers.insert(job_type, handler);
    }

    pub fn resolve(&self, job_type: &str) -> Arc<dyn JobHandler> {
        self.handlers
            .get(job_type)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    pub fn contains(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    pub fn job_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_builtin_handlers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_types_registered() {
        let registry = HandlerRegistry::with_builtin_handlers();
        assert_eq!(
            registry.job_types(),
            vec![
                "batch_computation",
                "data_processing",
                "generic",
                "machine_learning"
            ]
        );
    }

    #[test]
    fn test_unknown_type_falls_back_to_generic() {
        let registry = HandlerRegistry::with_builtin_handlers();
        assert!(!registry.contains("video_transcode"));
        assert_eq!(registry.resolve("video_transcode").job_type(), GENERIC_JOB_TYPE);
        assert_eq!(
            registry.resolve("data_processing").job_type(),
            "data_processing"
        );
    }
}
