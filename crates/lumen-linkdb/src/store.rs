//! The topology and resource store.
//!
//! All durable platform state lives here: POPs, links, spectrum slots,
//! interface ownership, vOp registry, and connection records. A single
//! writer lock guards the whole state, so the multi-link slot transition in
//! [`Store::allocate`] is atomic: no interleaving of two allocations can
//! produce overlapping ranges.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;

use lumen_common::models::{
    Allocation, ComputedPath, Connection, ConnectionStatus, Interface, InterfaceRef, Link, Pop,
    Router, SlotRange, SlotState, Topology, VirtualOperator,
};

use lumen_common::graph;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no contiguous block of {required} free slots on the requested path")]
    NoSpectrum { required: usize },
    #[error("path infeasible: {0}")]
    PathInfeasible(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("interfaces unavailable: {0:?}")]
    InterfaceUnavailable(Vec<String>),
    #[error("{0}")]
    Validation(String),
}

impl StoreError {
    /// Stable machine-readable kind, carried in REST error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::NoSpectrum { .. } => "no_spectrum",
            StoreError::PathInfeasible(_) => "path_infeasible",
            StoreError::Conflict(_) => "conflict",
            StoreError::NotFound(_) => "not_found",
            StoreError::InterfaceUnavailable(_) => "interface_unavailable",
            StoreError::Validation(_) => "validation",
        }
    }
}

#[derive(Default)]
struct State {
    pops: BTreeMap<String, Pop>,
    links: BTreeMap<String, Link>,
    vops: BTreeMap<String, VirtualOperator>,
    connections: BTreeMap<String, Connection>,
    allocations: BTreeMap<String, Allocation>,
}

/// Shared handle to the store. Cheap to clone.
#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<RwLock<State>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Topology ────────────────────────────────────────────────

    pub async fn add_pop(&self, pop: Pop) -> Result<(), StoreError> {
        let mut state = self.inner.write().await;
        if state.pops.contains_key(&pop.id) {
            return Err(StoreError::Conflict(format!("pop {} already exists", pop.id)));
        }
        state.pops.insert(pop.id.clone(), pop);
        Ok(())
    }

    pub async fn delete_pop(&self, pop_id: &str) -> Result<(), StoreError> {
        let mut state = self.inner.write().await;
        if state.links.values().any(|l| l.connects(pop_id)) {
            return Err(StoreError::Conflict(format!(
                "pop {pop_id} still has attached links"
            )));
        }
        state
            .pops
            .remove(pop_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("pop {pop_id}")))
    }

    pub async fn add_router(&self, pop_id: &str, router: Router) -> Result<(), StoreError> {
        let mut state = self.inner.write().await;
        let pop = state
            .pops
            .get_mut(pop_id)
            .ok_or_else(|| StoreError::NotFound(format!("pop {pop_id}")))?;
        if pop.routers.iter().any(|r| r.id == router.id) {
            return Err(StoreError::Conflict(format!(
                "router {} already exists in pop {pop_id}",
                router.id
            )));
        }
        pop.routers.push(router);
        Ok(())
    }

    pub async fn delete_router(&self, pop_id: &str, router_id: &str) -> Result<(), StoreError> {
        let mut state = self.inner.write().await;
        let pop = state
            .pops
            .get_mut(pop_id)
            .ok_or_else(|| StoreError::NotFound(format!("pop {pop_id}")))?;
        let Some(idx) = pop.routers.iter().position(|r| r.id == router_id) else {
            return Err(StoreError::NotFound(format!("router {router_id}")));
        };
        if pop.routers[idx].interfaces.iter().any(|i| i.owner.is_some()) {
            return Err(StoreError::Conflict(format!(
                "router {router_id} still has reserved interfaces"
            )));
        }
        pop.routers.remove(idx);
        Ok(())
    }

    pub async fn add_link(&self, mut link: Link, slot_count: usize) -> Result<Link, StoreError> {
        let mut state = self.inner.write().await;
        if !state.pops.contains_key(&link.pop_a) || !state.pops.contains_key(&link.pop_b) {
            return Err(StoreError::Validation(format!(
                "link {} references unknown pops",
                link.id
            )));
        }
        if state.links.contains_key(&link.id) {
            return Err(StoreError::Conflict(format!(
                "link {} already exists",
                link.id
            )));
        }
        if link.slots.is_empty() {
            link.slots = vec![SlotState::Free; slot_count];
        }
        state.links.insert(link.id.clone(), link.clone());
        Ok(link)
    }

    pub async fn delete_link(&self, link_id: &str) -> Result<(), StoreError> {
        let mut state = self.inner.write().await;
        let link = state
            .links
            .get(link_id)
            .ok_or_else(|| StoreError::NotFound(format!("link {link_id}")))?;
        if link.slots.iter().any(|s| !s.is_free()) {
            return Err(StoreError::Conflict(format!(
                "link {link_id} still carries allocated spectrum"
            )));
        }
        state.links.remove(link_id);
        Ok(())
    }

    pub async fn topology(&self) -> Topology {
        let state = self.inner.read().await;
        Topology {
            pops: state.pops.values().cloned().collect(),
            links: state.links.values().cloned().collect(),
        }
    }

    pub async fn frequencies(&self, link_id: &str) -> Result<Vec<SlotState>, StoreError> {
        let state = self.inner.read().await;
        state
            .links
            .get(link_id)
            .map(|l| l.slots.clone())
            .ok_or_else(|| StoreError::NotFound(format!("link {link_id}")))
    }

    pub async fn paths(&self, src: &str, dst: &str, k: usize) -> Result<Vec<ComputedPath>, StoreError> {
        let state = self.inner.read().await;
        if !state.pops.contains_key(src) {
            return Err(StoreError::NotFound(format!("pop {src}")));
        }
        if !state.pops.contains_key(dst) {
            return Err(StoreError::NotFound(format!("pop {dst}")));
        }
        let links: Vec<Link> = state.links.values().cloned().collect();
        Ok(graph::k_shortest_paths(&links, src, dst, k))
    }

    // ── Interface ownership ─────────────────────────────────────

    /// Reserve all listed interfaces for a vOp, atomically.
    ///
    /// Every interface must exist, be unowned, and have a transceiver
    /// present; otherwise the full failure list is returned and nothing is
    /// reserved.
    pub async fn reserve_interfaces(
        &self,
        vop_id: &str,
        refs: &[InterfaceRef],
    ) -> Result<(), StoreError> {
        let mut state = self.inner.write().await;

        let mut failures = Vec::new();
        for r in refs {
            match lookup_interface(&state, r) {
                Some(iface) if iface.owner.as_deref() == Some(vop_id) => {
                    failures.push(format!("{}: already reserved by this vOp", r.interface_id));
                }
                Some(iface) if iface.owner.is_some() => {
                    failures.push(format!(
                        "{}: owned by {}",
                        r.interface_id,
                        iface.owner.as_deref().unwrap_or("?")
                    ));
                }
                Some(iface) if !iface.transceiver_present => {
                    failures.push(format!("{}: no transceiver", r.interface_id));
                }
                Some(_) => {}
                None => failures.push(format!(
                    "{}/{}/{}: unknown interface",
                    r.pop_id, r.router_id, r.interface_id
                )),
            }
        }
        if !failures.is_empty() {
            return Err(StoreError::InterfaceUnavailable(failures));
        }

        for r in refs {
            if let Some(iface) = lookup_interface_mut(&mut state, r) {
                iface.owner = Some(vop_id.to_string());
            }
        }
        Ok(())
    }

    /// Release every interface owned by the vOp. Returns how many were freed.
    pub async fn release_interfaces(&self, vop_id: &str) -> usize {
        let mut state = self.inner.write().await;
        let mut released = 0;
        for pop in state.pops.values_mut() {
            for router in &mut pop.routers {
                for iface in &mut router.interfaces {
                    if iface.owner.as_deref() == Some(vop_id) {
                        iface.owner = None;
                        released += 1;
                    }
                }
            }
        }
        released
    }

    // ── vOp registry ────────────────────────────────────────────

    pub async fn put_vop(&self, vop: VirtualOperator) {
        let mut state = self.inner.write().await;
        state.vops.insert(vop.id.clone(), vop);
    }

    pub async fn get_vop(&self, id: &str) -> Option<VirtualOperator> {
        self.inner.read().await.vops.get(id).cloned()
    }

    pub async fn list_vops(&self) -> Vec<VirtualOperator> {
        self.inner.read().await.vops.values().cloned().collect()
    }

    pub async fn delete_vop(&self, id: &str) -> bool {
        self.inner.write().await.vops.remove(id).is_some()
    }

    // ── Spectrum allocation ─────────────────────────────────────

    /// First-fit allocation of `slots_required` contiguous slots on every
    /// link of `path`, keyed by `connection_id`.
    pub async fn allocate(
        &self,
        connection_id: &str,
        path: &[String],
        slots_required: usize,
    ) -> Result<SlotRange, StoreError> {
        if path.is_empty() {
            return Err(StoreError::PathInfeasible("empty path".into()));
        }
        if slots_required == 0 {
            return Err(StoreError::Validation("slots_required must be > 0".into()));
        }

        let mut state = self.inner.write().await;
        if state.allocations.contains_key(connection_id) {
            return Err(StoreError::Conflict(format!(
                "connection {connection_id} already holds an allocation"
            )));
        }
        for link_id in path {
            if !state.links.contains_key(link_id) {
                return Err(StoreError::PathInfeasible(format!(
                    "unknown link {link_id} in path"
                )));
            }
        }

        // Intersection of free-masks across all links on the path.
        let grid = path
            .iter()
            .map(|id| state.links[id].slots.len())
            .min()
            .unwrap_or(0);
        let free: Vec<bool> = (0..grid)
            .map(|i| path.iter().all(|id| state.links[id].slots[i].is_free()))
            .collect();

        // Lowest contiguous window of the required width wins.
        let start = first_fit(&free, slots_required)
            .ok_or(StoreError::NoSpectrum {
                required: slots_required,
            })?;
        let range = SlotRange {
            start,
            count: slots_required,
        };

        for link_id in path {
            let link = state.links.get_mut(link_id).expect("checked above");
            for i in range.indices() {
                link.slots[i] = SlotState::Reserved {
                    connection_id: connection_id.to_string(),
                };
            }
        }
        state.allocations.insert(
            connection_id.to_string(),
            Allocation {
                connection_id: connection_id.to_string(),
                path: path.to_vec(),
                range,
            },
        );
        Ok(range)
    }

    /// Release a connection's slots back to `Free` and drop its record.
    ///
    /// Idempotent: releasing an unknown connection is a no-op.
    pub async fn release(&self, connection_id: &str) -> bool {
        let mut state = self.inner.write().await;
        let Some(alloc) = state.allocations.remove(connection_id) else {
            state.connections.remove(connection_id);
            return false;
        };
        for link_id in &alloc.path {
            if let Some(link) = state.links.get_mut(link_id) {
                for i in alloc.range.indices() {
                    if link.slots[i].holder() == Some(connection_id) {
                        link.slots[i] = SlotState::Free;
                    }
                }
            }
        }
        state.connections.remove(connection_id);
        true
    }

    /// Transition a connection's slots `Reserved → Active`.
    pub async fn activate_slots(&self, connection_id: &str) -> Result<(), StoreError> {
        let mut state = self.inner.write().await;
        let alloc = state
            .allocations
            .get(connection_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("allocation for {connection_id}")))?;
        for link_id in &alloc.path {
            if let Some(link) = state.links.get_mut(link_id) {
                for i in alloc.range.indices() {
                    if link.slots[i].holder() == Some(connection_id) {
                        link.slots[i] = SlotState::Active {
                            connection_id: connection_id.to_string(),
                        };
                    }
                }
            }
        }
        Ok(())
    }

    // ── Connection records ──────────────────────────────────────

    pub async fn upsert_connection(&self, conn: Connection) {
        let mut state = self.inner.write().await;
        state.connections.insert(conn.id.clone(), conn);
    }

    pub async fn get_connection(&self, id: &str) -> Option<Connection> {
        self.inner.read().await.connections.get(id).cloned()
    }

    pub async fn list_connections(&self) -> Vec<Connection> {
        self.inner
            .read()
            .await
            .connections
            .values()
            .cloned()
            .collect()
    }

    pub async fn set_connection_status(
        &self,
        id: &str,
        status: ConnectionStatus,
    ) -> Result<(), StoreError> {
        {
            let mut state = self.inner.write().await;
            let conn = state
                .connections
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(format!("connection {id}")))?;
            conn.status = status;
        }
        // Slots follow the record: active connections hold Active slots.
        if status == ConnectionStatus::Active {
            self.activate_slots(id).await?;
        }
        Ok(())
    }
}

/// Scan for the lowest index starting a run of `required` free slots.
fn first_fit(free: &[bool], required: usize) -> Option<usize> {
    let mut run = 0usize;
    for (i, ok) in free.iter().enumerate() {
        if *ok {
            run += 1;
            if run == required {
                return Some(i + 1 - required);
            }
        } else {
            run = 0;
        }
    }
    None
}

fn lookup_interface<'a>(state: &'a State, r: &InterfaceRef) -> Option<&'a Interface> {
    state
        .pops
        .get(&r.pop_id)?
        .routers
        .iter()
        .find(|router| router.id == r.router_id)?
        .interfaces
        .iter()
        .find(|iface| iface.id == r.interface_id)
}

fn lookup_interface_mut<'a>(state: &'a mut State, r: &InterfaceRef) -> Option<&'a mut Interface> {
    state
        .pops
        .get_mut(&r.pop_id)?
        .routers
        .iter_mut()
        .find(|router| router.id == r.router_id)?
        .interfaces
        .iter_mut()
        .find(|iface| iface.id == r.interface_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_common::models::Router;

    fn pop(id: &str) -> Pop {
        Pop {
            id: id.into(),
            name: id.to_uppercase(),
            location: "lab".into(),
            routers: vec![Router {
                id: "router1".into(),
                pop_id: id.into(),
                interfaces: vec![
                    Interface {
                        id: "Ethernet48".into(),
                        port: 48,
                        owner: None,
                        admin_up: true,
                        oper_up: true,
                        transceiver_present: true,
                    },
                    Interface {
                        id: "Ethernet56".into(),
                        port: 56,
                        owner: None,
                        admin_up: true,
                        oper_up: true,
                        transceiver_present: false,
                    },
                ],
            }],
        }
    }

    fn link(id: &str, a: &str, b: &str, slots: usize) -> Link {
        Link {
            id: id.into(),
            pop_a: a.into(),
            pop_b: b.into(),
            distance_km: 80.0,
            slots: vec![SlotState::Free; slots],
        }
    }

    async fn two_pop_store() -> Store {
        let store = Store::new();
        store.add_pop(pop("pop1")).await.unwrap();
        store.add_pop(pop("pop2")).await.unwrap();
        store
            .add_link(link("link-pop1-pop2", "pop1", "pop2", 16), 16)
            .await
            .unwrap();
        store
    }

    fn iface_ref(pop: &str, iface: &str) -> InterfaceRef {
        InterfaceRef {
            pop_id: pop.into(),
            router_id: "router1".into(),
            interface_id: iface.into(),
        }
    }

    #[test]
    fn first_fit_scans_from_lowest_index() {
        let free = vec![false, true, true, false, true, true, true];
        assert_eq!(first_fit(&free, 2), Some(1));
        assert_eq!(first_fit(&free, 3), Some(4));
        assert_eq!(first_fit(&free, 4), None);
        assert_eq!(first_fit(&[], 1), None);
    }

    #[tokio::test]
    async fn first_fit_picks_lowest_block_on_empty_grid() {
        let store = two_pop_store().await;
        let range = store
            .allocate("con_1", &["link-pop1-pop2".into()], 8)
            .await
            .unwrap();
        assert_eq!(range, SlotRange { start: 0, count: 8 });
    }

    #[tokio::test]
    async fn allocations_are_disjoint_and_contiguous() {
        let store = two_pop_store().await;
        let a = store
            .allocate("con_a", &["link-pop1-pop2".into()], 4)
            .await
            .unwrap();
        let b = store
            .allocate("con_b", &["link-pop1-pop2".into()], 4)
            .await
            .unwrap();
        assert_eq!(a, SlotRange { start: 0, count: 4 });
        assert_eq!(b, SlotRange { start: 4, count: 4 });

        let slots = store.frequencies("link-pop1-pop2").await.unwrap();
        for i in a.indices() {
            assert_eq!(slots[i].holder(), Some("con_a"));
        }
        for i in b.indices() {
            assert_eq!(slots[i].holder(), Some("con_b"));
        }
    }

    #[tokio::test]
    async fn allocate_release_restores_slot_map() {
        let store = two_pop_store().await;
        let before = store.frequencies("link-pop1-pop2").await.unwrap();

        store
            .allocate("con_1", &["link-pop1-pop2".into()], 6)
            .await
            .unwrap();
        assert!(store.release("con_1").await);

        let after = store.frequencies("link-pop1-pop2").await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn no_spectrum_when_fragmented() {
        let store = two_pop_store().await;
        // 16-slot grid: two 7-slot allocations leave only slots 14..15.
        store
            .allocate("con_1", &["link-pop1-pop2".into()], 7)
            .await
            .unwrap();
        store
            .allocate("con_2", &["link-pop1-pop2".into()], 7)
            .await
            .unwrap();
        let err = store
            .allocate("con_3", &["link-pop1-pop2".into()], 3)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NoSpectrum { required: 3 }));
    }

    #[tokio::test]
    async fn double_allocation_for_same_connection_conflicts() {
        let store = two_pop_store().await;
        store
            .allocate("con_1", &["link-pop1-pop2".into()], 2)
            .await
            .unwrap();
        let err = store
            .allocate("con_1", &["link-pop1-pop2".into()], 2)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn spectrum_continuity_across_multi_link_path() {
        let store = Store::new();
        for p in ["pop1", "pop2", "pop3"] {
            store.add_pop(pop(p)).await.unwrap();
        }
        store
            .add_link(link("l-12", "pop1", "pop2", 16), 16)
            .await
            .unwrap();
        store
            .add_link(link("l-23", "pop2", "pop3", 16), 16)
            .await
            .unwrap();

        // Occupy slots 0..3 on l-23 only; the intersection forces a higher
        // identical range on both links.
        store
            .allocate("con_x", &["l-23".into()], 3)
            .await
            .unwrap();
        let range = store
            .allocate("con_y", &["l-12".into(), "l-23".into()], 4)
            .await
            .unwrap();
        assert_eq!(range, SlotRange { start: 3, count: 4 });

        for link_id in ["l-12", "l-23"] {
            let slots = store.frequencies(link_id).await.unwrap();
            for i in range.indices() {
                assert_eq!(slots[i].holder(), Some("con_y"), "link {link_id} slot {i}");
            }
        }
    }

    #[tokio::test]
    async fn concurrent_allocations_never_overlap() {
        let store = two_pop_store().await;
        let mut handles = Vec::new();
        for n in 0..4 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .allocate(&format!("con_{n}"), &["link-pop1-pop2".into()], 4)
                    .await
            }));
        }

        let mut ranges = Vec::new();
        for h in handles {
            ranges.push(h.await.unwrap().unwrap());
        }

        ranges.sort_by_key(|r| r.start);
        for pair in ranges.windows(2) {
            assert!(
                pair[0].start + pair[0].count <= pair[1].start,
                "overlapping ranges {pair:?}"
            );
        }
    }

    #[tokio::test]
    async fn reservation_is_all_or_nothing() {
        let store = two_pop_store().await;

        // Ethernet56 has no transceiver, so the whole request must fail...
        let err = store
            .reserve_interfaces(
                "vOp2",
                &[iface_ref("pop1", "Ethernet48"), iface_ref("pop1", "Ethernet56")],
            )
            .await
            .unwrap_err();
        let StoreError::InterfaceUnavailable(failures) = err else {
            panic!("expected InterfaceUnavailable");
        };
        assert_eq!(failures.len(), 1);

        // ...leaving Ethernet48 unowned.
        let topo = store.topology().await;
        let iface = &topo.pops[0].routers[0].interfaces[0];
        assert_eq!(iface.owner, None);
    }

    #[tokio::test]
    async fn interface_exclusivity() {
        let store = two_pop_store().await;
        store
            .reserve_interfaces("vOp1", &[iface_ref("pop1", "Ethernet48")])
            .await
            .unwrap();

        let err = store
            .reserve_interfaces("vOp2", &[iface_ref("pop1", "Ethernet48")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InterfaceUnavailable(_)));

        assert_eq!(store.release_interfaces("vOp1").await, 1);
        store
            .reserve_interfaces("vOp2", &[iface_ref("pop1", "Ethernet48")])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn activate_slots_follows_status() {
        let store = two_pop_store().await;
        store
            .allocate("con_1", &["link-pop1-pop2".into()], 2)
            .await
            .unwrap();
        store.activate_slots("con_1").await.unwrap();

        let slots = store.frequencies("link-pop1-pop2").await.unwrap();
        assert_eq!(
            slots[0],
            SlotState::Active {
                connection_id: "con_1".into()
            }
        );

        // Release works from Active as well.
        assert!(store.release("con_1").await);
        let slots = store.frequencies("link-pop1-pop2").await.unwrap();
        assert!(slots.iter().all(|s| s.is_free()));
    }

    #[tokio::test]
    async fn router_lifecycle_guarded_by_reservations() {
        let store = two_pop_store().await;
        let router2 = Router {
            id: "router2".into(),
            pop_id: "pop1".into(),
            interfaces: vec![],
        };
        store.add_router("pop1", router2.clone()).await.unwrap();
        assert!(matches!(
            store.add_router("pop1", router2).await,
            Err(StoreError::Conflict(_))
        ));

        store
            .reserve_interfaces("vOp1", &[iface_ref("pop1", "Ethernet48")])
            .await
            .unwrap();
        assert!(matches!(
            store.delete_router("pop1", "router1").await,
            Err(StoreError::Conflict(_))
        ));

        store.release_interfaces("vOp1").await;
        store.delete_router("pop1", "router1").await.unwrap();
        store.delete_router("pop1", "router2").await.unwrap();
        assert!(matches!(
            store.delete_router("pop1", "router2").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_link_guarded_by_allocations() {
        let store = two_pop_store().await;
        store
            .allocate("con_1", &["link-pop1-pop2".into()], 2)
            .await
            .unwrap();
        assert!(matches!(
            store.delete_link("link-pop1-pop2").await,
            Err(StoreError::Conflict(_))
        ));
        store.release("con_1").await;
        store.delete_link("link-pop1-pop2").await.unwrap();
    }
}
