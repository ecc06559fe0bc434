mod block;
mod range;
mod tx;

pub use block::{L2Block, L2Transaction, QueueOrigin};
pub use range::{RangeError, SubmissionRange};
pub use tx::{SignedTx, TxReceipt};
