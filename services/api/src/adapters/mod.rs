pub mod firestore;
pub mod http;
pub mod identity;
pub mod memory;
pub mod storage;

pub use firestore::FirestoreStore;
pub use identity::IdentityToolkit;
pub use memory::{MemoryDocumentStore, MemoryIdentity, MemoryObjectStorage};
pub use storage::FirebaseStorage;
