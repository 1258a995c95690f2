//! 索引模块
//!
//! 嵌入模型、向量索引、文档抽取和分块，均以 trait 形式暴露，
//! 上层编排逻辑可以用确定性的替身进行测试。

pub mod chunker;
pub mod embedding;
pub mod loader;
pub mod vector;

pub use chunker::{RecursiveChunker, TextChunker};
pub use embedding::{EmbeddingModel, OllamaEmbeddingModel, SimpleEmbeddingModel, create_embedding_model};
pub use loader::{DocumentLoader, DocxLoader, ExtensionLoader, PlainTextLoader};
pub use vector::{FlatVectorStore, Passage, VectorStore};
