use anyhow::bail;

use super::Ai;
use crate::protocol::OrderRequest;
use crate::world::Orders;

/// Never gives orders: every request is answered with a `500`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Broken;

impl Ai for Broken {
    fn orders(&self, _request: &OrderRequest) -> anyhow::Result<Orders> {
        bail!("Oh noes")
    }
}
