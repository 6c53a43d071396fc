//! # Typed Graph View
//!
//! `PropertyGraph` binds compile-time attribute types to named columns of a
//! loaded `Rdg`, once, at construction. Afterwards every access is a typed
//! slice index: no name lookup, no type check, no copy.
//!
//! ## Binding
//!
//! Attribute types implement `Property`, a marker naming the column value
//! type. A view is declared with tuples of them:
//!
//! ```ignore
//! struct Rank;
//! impl Property for Rank { type Value = f64; }
//! struct Weight;
//! impl Property for Weight { type Value = u32; }
//!
//! let graph = PropertyGraph::<_, (Rank,), (Weight,)>::make(&rdg, &["rank"], &["weight"])?;
//! ```
//!
//! The i-th type binds to the i-th name. Construction fails if a name is
//! missing (`PropertyNotFound`) or its column holds another type
//! (`TypeMismatch`); bytes are never reinterpreted.
//!
//! ## Ownership
//!
//! The view borrows the `Rdg` through `R: Borrow<Rdg>`. With `&mut Rdg` it
//! can also write attributes; the borrow checker then guarantees a single
//! writer and no other reader for the view's lifetime.

use crate::column::{ColumnValue, DataType, Table};
use crate::rdg::Rdg;
use crate::topology::CsrTopology;
use crate::{EdgeId, NodeId, RdgError};
use std::any::TypeId;
use std::borrow::{Borrow, BorrowMut};
use std::fmt;
use std::marker::PhantomData;
use std::ops::Range;

// =============================================================================
// ATTRIBUTE TRAITS
// =============================================================================

/// An attribute type: a marker naming the value type of its column.
pub trait Property: 'static {
    /// Column element type.
    type Value: ColumnValue;
}

/// A tuple of `Property` types.
pub trait PropertyTuple: 'static {
    /// Type identity and column type of each member, in order.
    fn bindings() -> Vec<(TypeId, DataType)>;
}

macro_rules! impl_property_tuple {
    ($($p:ident),*) => {
        impl<$($p: Property),*> PropertyTuple for ($($p,)*) {
            fn bindings() -> Vec<(TypeId, DataType)> {
                vec![$((
                    TypeId::of::<$p>(),
                    <<$p as Property>::Value as ColumnValue>::DATA_TYPE,
                )),*]
            }
        }
    };
}

impl_property_tuple!();
impl_property_tuple!(A);
impl_property_tuple!(A, B);
impl_property_tuple!(A, B, C);
impl_property_tuple!(A, B, C, D);
impl_property_tuple!(A, B, C, D, E);
impl_property_tuple!(A, B, C, D, E, F);

/// Column positions of a tuple's members, resolved once.
#[derive(Debug, Clone)]
struct Bound {
    type_ids: Vec<TypeId>,
    columns: Vec<usize>,
}

impl Bound {
    fn resolve<T: PropertyTuple>(table: &Table, names: &[&str]) -> Result<Self, RdgError> {
        let bindings = T::bindings();
        if bindings.len() != names.len() {
            return Err(RdgError::InvalidArgument(format!(
                "{} attribute types bound to {} names",
                bindings.len(),
                names.len()
            )));
        }

        let mut type_ids = Vec::with_capacity(bindings.len());
        let mut columns = Vec::with_capacity(bindings.len());
        for ((type_id, data_type), name) in bindings.into_iter().zip(names) {
            if type_ids.contains(&type_id) {
                return Err(RdgError::InvalidArgument(format!(
                    "attribute type bound twice (second time to {name})"
                )));
            }
            let (index, column) = table
                .column_by_name(name)
                .ok_or_else(|| RdgError::PropertyNotFound((*name).to_string()))?;
            if column.data_type() != data_type {
                return Err(RdgError::TypeMismatch {
                    name: (*name).to_string(),
                    expected: data_type.to_string(),
                    actual: column.data_type().to_string(),
                });
            }
            type_ids.push(type_id);
            columns.push(index);
        }
        Ok(Self { type_ids, columns })
    }

    fn column_of<P: Property>(&self) -> Option<usize> {
        let id = TypeId::of::<P>();
        self.type_ids
            .iter()
            .position(|t| *t == id)
            .map(|i| self.columns[i])
    }
}

// =============================================================================
// EDGE RANGE
// =============================================================================

/// The edges of one node: lazy, finite and restartable (clone it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRange {
    range: Range<u64>,
}

impl Iterator for EdgeRange {
    type Item = EdgeId;

    fn next(&mut self) -> Option<EdgeId> {
        self.range.next().map(EdgeId)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.range.size_hint()
    }
}

impl DoubleEndedIterator for EdgeRange {
    fn next_back(&mut self) -> Option<EdgeId> {
        self.range.next_back().map(EdgeId)
    }
}

// =============================================================================
// PROPERTY GRAPH
// =============================================================================

/// Typed view over a partition.
pub struct PropertyGraph<R, N, E> {
    rdg: R,
    nodes: Bound,
    edges: Bound,
    num_nodes: usize,
    num_edges: usize,
    _attrs: PhantomData<fn() -> (N, E)>,
}

impl<R: Borrow<Rdg>, N, E> fmt::Debug for PropertyGraph<R, N, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyGraph")
            .field("num_nodes", &self.num_nodes)
            .field("num_edges", &self.num_edges)
            .field("node_columns", &self.nodes.columns)
            .field("edge_columns", &self.edges.columns)
            .finish()
    }
}

impl<R, N, E> PropertyGraph<R, N, E>
where
    R: Borrow<Rdg>,
    N: PropertyTuple,
    E: PropertyTuple,
{
    /// Bind `N` to the node columns `node_names` and `E` to the edge columns
    /// `edge_names`, positionally.
    pub fn make(rdg: R, node_names: &[&str], edge_names: &[&str]) -> Result<Self, RdgError> {
        let (nodes, edges, num_nodes, num_edges) = {
            let r = rdg.borrow();
            let topology = CsrTopology::parse(r.topology())?;
            check_rows("node", r.node_table(), topology.num_nodes())?;
            check_rows("edge", r.edge_table(), topology.num_edges())?;
            (
                Bound::resolve::<N>(r.node_table(), node_names)?,
                Bound::resolve::<E>(r.edge_table(), edge_names)?,
                topology.num_nodes(),
                topology.num_edges(),
            )
        };
        Ok(Self {
            rdg,
            nodes,
            edges,
            num_nodes,
            num_edges,
            _attrs: PhantomData,
        })
    }

    /// Bind by the tables' own column names: the i-th type binds to the
    /// i-th column.
    pub fn make_all(rdg: R) -> Result<Self, RdgError> {
        let (node_names, edge_names) = {
            let r = rdg.borrow();
            let own = |t: &Table| -> Vec<String> {
                t.column_names().into_iter().map(String::from).collect()
            };
            (own(r.node_table()), own(r.edge_table()))
        };
        let node_refs: Vec<&str> = node_names.iter().map(String::as_str).collect();
        let edge_refs: Vec<&str> = edge_names.iter().map(String::as_str).collect();
        Self::make(rdg, &node_refs, &edge_refs)
    }

    fn topology(&self) -> CsrTopology<'_> {
        // parse() succeeded at construction and the topology cannot change
        // while the view holds the partition
        match CsrTopology::parse_validated(self.rdg.borrow().topology()) {
            Ok(topology) => topology,
            Err(e) => {
                tracing::error!(error = %e, "topology changed under a bound view");
                std::process::abort()
            }
        }
    }

    /// The underlying partition.
    #[must_use]
    pub fn rdg(&self) -> &Rdg {
        self.rdg.borrow()
    }

    /// Node count.
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Edge count.
    #[must_use]
    pub fn num_edges(&self) -> usize {
        self.num_edges
    }

    /// Node ids, in order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + Clone {
        (0..self.num_nodes as u32).map(NodeId)
    }

    /// First edge of `node`. Ids past the last node get `num_edges`.
    #[must_use]
    pub fn edge_begin(&self, node: NodeId) -> EdgeId {
        self.topology().edge_begin(node)
    }

    /// One past the last edge of `node`.
    #[must_use]
    pub fn edge_end(&self, node: NodeId) -> EdgeId {
        self.topology().edge_end(node)
    }

    /// Outgoing edges of `node`; empty for ids past the last node.
    #[must_use]
    pub fn edges(&self, node: NodeId) -> EdgeRange {
        EdgeRange {
            range: self.topology().edge_range(node),
        }
    }

    /// Destination of `edge`, if the edge exists.
    #[must_use]
    pub fn get_edge_dest(&self, edge: EdgeId) -> Option<NodeId> {
        self.topology().edge_dest(edge)
    }

    /// Edge from `node` to `dest` by binary search, or `edge_end(node)` if
    /// there is none.
    ///
    /// Precondition: `node`'s edges are sorted by destination. Otherwise the
    /// result is unspecified.
    #[must_use]
    pub fn find_edge_sorted_by_dest(&self, node: NodeId, dest: NodeId) -> EdgeId {
        let topology = self.topology();
        let Range { mut start, end } = topology.edge_range(node);
        let mut hi = end;
        while start < hi {
            let mid = start + (hi - start) / 2;
            if topology.edge_dest(EdgeId(mid)) < Some(dest) {
                start = mid + 1;
            } else {
                hi = mid;
            }
        }
        if start < end && topology.edge_dest(EdgeId(start)) == Some(dest) {
            EdgeId(start)
        } else {
            EdgeId(end)
        }
    }

    /// Attribute `P` of `node`, if `P` is bound and the node exists.
    #[must_use]
    pub fn get_data<P: Property>(&self, node: NodeId) -> Option<&P::Value> {
        let column = self.nodes.column_of::<P>()?;
        typed_slice::<P>(self.rdg.borrow().node_table(), column)?.get(node.index())
    }

    /// Attribute `P` of `edge`, if `P` is bound and the edge exists.
    #[must_use]
    pub fn get_edge_data<P: Property>(&self, edge: EdgeId) -> Option<&P::Value> {
        let column = self.edges.column_of::<P>()?;
        typed_slice::<P>(self.rdg.borrow().edge_table(), column)?.get(edge.index())
    }

    /// The whole column bound to node attribute `P`.
    #[must_use]
    pub fn node_column<P: Property>(&self) -> Option<&[P::Value]> {
        let column = self.nodes.column_of::<P>()?;
        typed_slice::<P>(self.rdg.borrow().node_table(), column)
    }

    /// The whole column bound to edge attribute `P`.
    #[must_use]
    pub fn edge_column<P: Property>(&self) -> Option<&[P::Value]> {
        let column = self.edges.column_of::<P>()?;
        typed_slice::<P>(self.rdg.borrow().edge_table(), column)
    }
}

impl<R, N, E> PropertyGraph<R, N, E>
where
    R: BorrowMut<Rdg>,
    N: PropertyTuple,
    E: PropertyTuple,
{
    /// Mutable attribute `P` of `node`. The column is rewritten on the next
    /// commit.
    pub fn get_data_mut<P: Property>(&mut self, node: NodeId) -> Option<&mut P::Value> {
        let column = self.nodes.column_of::<P>()?;
        self.rdg
            .borrow_mut()
            .node_property_mut(column)?
            .typed_mut::<P::Value>()
            .ok()?
            .get_mut(node.index())
    }

    /// Mutable attribute `P` of `edge`. The column is rewritten on the next
    /// commit.
    pub fn get_edge_data_mut<P: Property>(&mut self, edge: EdgeId) -> Option<&mut P::Value> {
        let column = self.edges.column_of::<P>()?;
        self.rdg
            .borrow_mut()
            .edge_property_mut(column)?
            .typed_mut::<P::Value>()
            .ok()?
            .get_mut(edge.index())
    }
}

fn typed_slice<P: Property>(table: &Table, column: usize) -> Option<&[P::Value]> {
    table.column(column)?.typed::<P::Value>().ok()
}

fn check_rows(kind: &str, table: &Table, expected: usize) -> Result<(), RdgError> {
    if !table.is_empty() && table.num_rows() != expected {
        return Err(RdgError::InvalidArgument(format!(
            "{kind} table has {} rows, topology has {expected}",
            table.num_rows()
        )));
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
