use std::{
    collections::BTreeSet,
    net::Ipv4Addr,
    sync::{Arc, Mutex, MutexGuard},
};

use ipnetwork::Ipv4Network;

use crate::{MonofleetError, MonofleetResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Hands out machine addresses from a subnet.
///
/// The network address, the gateway (first host) and the broadcast address are never handed
/// out. Clones share the same pool.
#[derive(Debug, Clone)]
pub struct IpPool {
    subnet: Ipv4Network,
    leased: Arc<Mutex<BTreeSet<Ipv4Addr>>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl IpPool {
    /// Creates an empty pool over `subnet`.
    pub fn new(subnet: Ipv4Network) -> Self {
        Self {
            subnet,
            leased: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    /// Leases the lowest free address.
    pub fn allocate(&self) -> MonofleetResult<Ipv4Addr> {
        let mut leased = self.lock();
        let network = self.subnet.network();
        let gateway = self.gateway();
        let broadcast = self.subnet.broadcast();

        let free = self
            .subnet
            .iter()
            .filter(|ip| *ip != network && *ip != gateway && *ip != broadcast)
            .find(|ip| !leased.contains(ip))
            .ok_or_else(|| MonofleetError::IpPoolExhausted(self.subnet.to_string()))?;

        leased.insert(free);
        Ok(free)
    }

    /// Returns an address to the pool. Releasing an address that is not leased does nothing.
    pub fn release(&self, ip: Ipv4Addr) -> bool {
        self.lock().remove(&ip)
    }

    /// The gateway address of the subnet.
    pub fn gateway(&self) -> Ipv4Addr {
        let network = u32::from(self.subnet.network());
        Ipv4Addr::from(network.saturating_add(1))
    }

    /// The subnet addresses are leased from.
    pub fn subnet(&self) -> Ipv4Network {
        self.subnet
    }

    /// How many addresses are currently leased.
    pub fn leased(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<Ipv4Addr>> {
        self.leased.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ip_pool_skips_network_and_gateway() -> anyhow::Result<()> {
        let pool = IpPool::new("10.0.0.0/24".parse()?);

        assert_eq!(pool.gateway(), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(pool.allocate()?, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(pool.allocate()?, Ipv4Addr::new(10, 0, 0, 3));
        assert_eq!(pool.leased(), 2);

        Ok(())
    }

    #[test]
    fn test_ip_pool_reuses_released_addresses() -> anyhow::Result<()> {
        let pool = IpPool::new("10.0.0.0/24".parse()?);

        let first = pool.allocate()?;
        let second = pool.allocate()?;
        assert!(pool.release(first));
        assert!(!pool.release(first));

        assert_eq!(pool.allocate()?, first);
        assert_ne!(pool.allocate()?, second);

        Ok(())
    }

    #[test]
    fn test_ip_pool_exhaustion() -> anyhow::Result<()> {
        // Only .2 is usable in a /30.
        let pool = IpPool::new("192.168.5.0/30".parse()?);

        assert_eq!(pool.allocate()?, Ipv4Addr::new(192, 168, 5, 2));
        assert!(matches!(
            pool.allocate(),
            Err(MonofleetError::IpPoolExhausted(_))
        ));

        Ok(())
    }

    #[test]
    fn test_ip_pool_clones_share_leases() -> anyhow::Result<()> {
        let pool = IpPool::new("10.1.0.0/29".parse()?);
        let other = pool.clone();

        let ip = pool.allocate()?;
        assert_eq!(other.leased(), 1);
        assert!(other.release(ip));
        assert_eq!(pool.leased(), 0);

        Ok(())
    }
}
