//! Chain layer: JSON-RPC client, wire codecs (keccak-256, secp256k1,
//! RLP, EVM ABI), contract call builders, executor calldata, signing,
//! fee quoting, submission, and the block source.

pub mod abi;
pub mod block_watcher;
pub mod contracts;
pub mod crypto;
pub mod error;
pub mod executor_abi;
pub mod gas;
pub mod http;
pub mod rlp;
pub mod rpc;
pub mod signer;
pub mod submitter;
pub mod telemetry;

pub use block_watcher::{BlockCursor, BlockWatcher, WatcherConfig};
pub use error::{Error, Result};
pub use executor_abi::{BatchParams, ExecutorParams, Swap};
pub use gas::{GasOracle, GasQuote};
pub use http::{HttpTransport, ReqwestTransport, SharedTransport};
pub use rpc::RpcClient;
pub use signer::{NonceManager, TxFields, Wallet};
pub use submitter::{RelayEndpoint, SubmitConfig, Submitter};
pub use telemetry::{MetricsEvent, MetricsLogger, VenueQuote};
