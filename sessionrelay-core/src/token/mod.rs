mod codec;
#[cfg(test)]
mod tests;

pub use codec::*;
