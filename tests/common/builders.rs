//! Test data builders for catalogs, stores and configs

use graph_batch_loader::config::LoaderConfig;
use graph_batch_loader::schema::{AttributeDecl, InMemoryCatalog};
use graph_batch_loader::source::InMemoryGraphStore;
use graph_batch_loader::types::{OutputFormat, PayloadKind, PrimitiveType, ScalarKind};

/// Catalog with one `Paper` vertex type and one `Cite` edge type
pub fn paper_catalog() -> InMemoryCatalog {
    InMemoryCatalog::new()
        .with_vertex_type(
            "Paper",
            [
                ("x", PrimitiveType::List(ScalarKind::Int)),
                ("y", PrimitiveType::Int),
                ("train_mask", PrimitiveType::Bool),
                ("title", PrimitiveType::String),
            ],
        )
        .with_edge_type(
            "Cite",
            "Paper",
            "Paper",
            [("time", PrimitiveType::Int), ("weight", PrimitiveType::Float)],
        )
}

/// Path of `n` papers citing their successor; every third one is in the
/// training set
pub fn path_store(n: usize) -> InMemoryGraphStore {
    let mut store = InMemoryGraphStore::new();
    for i in 0..n {
        store = store.with_vertex(
            i.to_string(),
            [
                ("x", format!("{} {} 1", i, i * 2)),
                ("y", (i % 3).to_string()),
                ("train_mask", (i % 3 == 0).to_string()),
                ("title", format!("paper-{}", i)),
            ],
        );
    }
    for i in 0..n.saturating_sub(1) {
        store = store.with_edge(
            i.to_string(),
            (i + 1).to_string(),
            [("time", i.to_string()), ("weight", format!("{}.5", i))],
        );
    }
    store
}

/// Builder for loader configs used across integration tests
pub struct ConfigBuilder {
    config: LoaderConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        let mut config = LoaderConfig::default();
        config.attributes.v_in_feats = AttributeDecl::names(["x"]);
        config.attributes.v_out_labels = AttributeDecl::names(["y"]);
        config.attributes.v_extra_feats = AttributeDecl::names(["train_mask"]);
        config.pipeline.shuffle_seed = Some(11);
        Self { config }
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batching.batch_size = Some(size);
        self
    }

    pub fn num_batches(mut self, n: usize) -> Self {
        self.config.batching.num_batches = Some(n);
        self
    }

    pub fn whole_graph(mut self) -> Self {
        self.config.batching.whole_graph = true;
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.pipeline.num_workers = n;
        self
    }

    pub fn buffer(mut self, n: usize) -> Self {
        self.config.pipeline.buffer_size = n;
        self
    }

    pub fn looping(mut self) -> Self {
        self.config.pipeline.looping = true;
        self
    }

    pub fn shuffle(mut self) -> Self {
        self.config.pipeline.shuffle = true;
        self
    }

    pub fn skip_malformed(mut self) -> Self {
        self.config.pipeline.skip_malformed = true;
        self
    }

    pub fn payload(mut self, payload: PayloadKind) -> Self {
        self.config.payload = payload;
        self
    }

    pub fn frames(mut self) -> Self {
        self.config.output_format = OutputFormat::Frames;
        self
    }

    pub fn edge_features(mut self, names: &[&str]) -> Self {
        self.config.attributes.e_in_feats = AttributeDecl::names(names.iter().copied());
        self
    }

    pub fn filter_by(mut self, attribute: &str) -> Self {
        self.config.sampling.filter_by = Some(attribute.to_string());
        self
    }

    pub fn build(self) -> LoaderConfig {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new().batch_size(4).workers(3).looping().build();
        assert_eq!(config.batching.batch_size, Some(4));
        assert_eq!(config.pipeline.num_workers, 3);
        assert!(config.pipeline.looping);
        assert!(config.validate().is_ok());
    }
}
