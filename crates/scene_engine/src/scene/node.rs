//! Scene node types
//!
//! Every node lives in the [`SceneGraph`](crate::scene::SceneGraph) arena and
//! is addressed by a [`NodeId`]. Ownership flows strictly downward: a group
//! owns its child list, the `parent` field is a back-reference used only for
//! traversal. The one many-owner case is the [`SharedGroup`], whose parent set
//! is the list of [`Link`] nodes that reference it.

use std::fmt;
use std::sync::Arc;

use crate::bounds::BoundingVolume;
use crate::foundation::math::Mat4;
use crate::pick::PickMask;
use crate::render::Renderable;
use crate::scene::{Billboard, LodGroup, MarkerGroup};
use crate::traversal::{CustomCullable, CustomPickTarget};

slotmap::new_key_type! {
    /// Stable handle to a node in the scene graph arena
    pub struct NodeId;
}

/// Ordered child list
#[derive(Debug, Clone, Default)]
pub struct Group {
    pub(crate) children: Vec<NodeId>,
}

impl Group {
    /// Children in traversal order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Group that applies a local transform to its children
#[derive(Debug, Clone)]
pub struct TransformGroup {
    pub(crate) group: Group,
    pub(crate) transform: Mat4,
}

impl TransformGroup {
    /// Local transform applied to children
    pub fn transform(&self) -> &Mat4 {
        &self.transform
    }
}

/// Subgraph that may appear under several [`Link`] nodes
///
/// The parent set holds every link currently referencing the group, in
/// registration order; its length is the group's reference count.
#[derive(Debug, Clone, Default)]
pub struct SharedGroup {
    pub(crate) group: Group,
    pub(crate) parents: Vec<NodeId>,
}

impl SharedGroup {
    /// Links referencing this group, first registered first
    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }

    /// Number of links holding this group
    pub fn reference_count(&self) -> usize {
        self.parents.len()
    }
}

/// Reference from a position in the graph to a [`SharedGroup`]
#[derive(Debug, Clone, Default)]
pub struct Link {
    pub(crate) target: Option<NodeId>,
}

impl Link {
    /// The shared group this link instances
    pub fn target(&self) -> Option<NodeId> {
        self.target
    }
}

/// Leaf wrapping something that can be drawn
#[derive(Clone)]
pub struct Shape {
    pub(crate) renderable: Arc<dyn Renderable>,
    pub(crate) render_order: i32,
    pub(crate) transparent: bool,
}

impl Shape {
    /// Create a shape for a renderable
    pub fn new(renderable: Arc<dyn Renderable>) -> Self {
        Self {
            renderable,
            render_order: 0,
            transparent: false,
        }
    }

    /// Set the render-order hint (lower draws first)
    pub fn with_render_order(mut self, order: i32) -> Self {
        self.render_order = order;
        self
    }

    /// Mark the shape as transparent
    pub fn with_transparency(mut self, transparent: bool) -> Self {
        self.transparent = transparent;
        self
    }

    /// The drawable object
    pub fn renderable(&self) -> &Arc<dyn Renderable> {
        &self.renderable
    }

    /// Render-order hint
    pub fn render_order(&self) -> i32 {
        self.render_order
    }

    /// Whether the shape is drawn in the transparent pass
    pub fn is_transparent(&self) -> bool {
        self.transparent
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shape")
            .field("renderable", &self.renderable.name())
            .field("render_order", &self.render_order)
            .field("transparent", &self.transparent)
            .finish()
    }
}

/// What a node is
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Plain grouping node
    Group(Group),
    /// Grouping node with a local transform
    TransformGroup(TransformGroup),
    /// Multi-parent subgraph root
    SharedGroup(SharedGroup),
    /// Instance of a shared group
    Link(Link),
    /// Group rotated every frame to face the viewer
    Billboard(Billboard),
    /// Group that shows one child based on viewer distance or screen size
    LodGroup(LodGroup),
    /// Group placed between the viewer and a tracked target
    MarkerGroup(MarkerGroup),
    /// Drawable leaf
    Shape(Shape),
}

/// How the traversal treats a node, resolved once when the node is created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Visit every child, applying the node's own transform if it has one
    Standard,
    /// Ask the node which children to visit and under what transform
    Custom,
    /// Continue into the referenced shared group
    Link,
    /// Emit as a renderable
    Leaf,
}

impl NodeKind {
    /// Create an empty group
    pub fn group() -> Self {
        Self::Group(Group::default())
    }

    /// Create an empty transform group
    pub fn transform_group(transform: Mat4) -> Self {
        Self::TransformGroup(TransformGroup { group: Group::default(), transform })
    }

    /// Create an empty shared group
    pub fn shared_group() -> Self {
        Self::SharedGroup(SharedGroup::default())
    }

    /// Create an unbound link
    pub fn link() -> Self {
        Self::Link(Link::default())
    }

    /// Create a shape leaf
    pub fn shape(shape: Shape) -> Self {
        Self::Shape(shape)
    }

    pub(crate) fn capability(&self) -> Capability {
        match self {
            Self::Group(_) | Self::TransformGroup(_) | Self::SharedGroup(_) => Capability::Standard,
            Self::Billboard(_) | Self::LodGroup(_) | Self::MarkerGroup(_) => Capability::Custom,
            Self::Link(_) => Capability::Link,
            Self::Shape(_) => Capability::Leaf,
        }
    }

    /// Child list, for every kind that has one
    pub fn group_data(&self) -> Option<&Group> {
        match self {
            Self::Group(group) => Some(group),
            Self::TransformGroup(tg) => Some(&tg.group),
            Self::SharedGroup(sg) => Some(&sg.group),
            Self::Billboard(b) => Some(&b.group),
            Self::LodGroup(l) => Some(&l.group),
            Self::MarkerGroup(m) => Some(&m.group),
            Self::Link(_) | Self::Shape(_) => None,
        }
    }

    pub(crate) fn group_data_mut(&mut self) -> Option<&mut Group> {
        match self {
            Self::Group(group) => Some(group),
            Self::TransformGroup(tg) => Some(&mut tg.group),
            Self::SharedGroup(sg) => Some(&mut sg.group),
            Self::Billboard(b) => Some(&mut b.group),
            Self::LodGroup(l) => Some(&mut l.group),
            Self::MarkerGroup(m) => Some(&mut m.group),
            Self::Link(_) | Self::Shape(_) => None,
        }
    }

    /// Local transform contributed to children by standard traversal
    pub fn local_transform(&self) -> Option<&Mat4> {
        match self {
            Self::TransformGroup(tg) => Some(&tg.transform),
            _ => None,
        }
    }

    pub(crate) fn as_custom_cullable(&self) -> Option<&dyn CustomCullable> {
        match self {
            Self::Billboard(b) => Some(b),
            Self::LodGroup(l) => Some(l),
            Self::MarkerGroup(m) => Some(m),
            _ => None,
        }
    }

    pub(crate) fn as_custom_pick_target(&self) -> Option<&dyn CustomPickTarget> {
        match self {
            Self::Billboard(b) => Some(b),
            Self::LodGroup(l) => Some(l),
            Self::MarkerGroup(m) => Some(m),
            _ => None,
        }
    }

    /// Short name for log messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Group(_) => "Group",
            Self::TransformGroup(_) => "TransformGroup",
            Self::SharedGroup(_) => "SharedGroup",
            Self::Link(_) => "Link",
            Self::Billboard(_) => "Billboard",
            Self::LodGroup(_) => "LodGroup",
            Self::MarkerGroup(_) => "MarkerGroup",
            Self::Shape(_) => "Shape",
        }
    }
}

/// Lazily recomputed bounds
///
/// Explicit bounds set by the application win over the derived value.
/// Marker groups are left out of their ancestors' bounds; `contains_marker`
/// records that one sits in the subtree.
#[derive(Debug, Clone, Default)]
pub(crate) struct BoundsCache {
    pub(crate) explicit: Option<BoundingVolume>,
    pub(crate) cached: BoundingVolume,
    pub(crate) contains_marker: bool,
    pub(crate) dirty: bool,
}

/// A node in the scene graph
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) name: Option<String>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) live: bool,
    pub(crate) bounds: BoundsCache,
    pub(crate) pick_mask: PickMask,
    pub(crate) capability: Capability,
    pub(crate) kind: NodeKind,
}

impl Node {
    pub(crate) fn new(kind: NodeKind) -> Self {
        Self {
            name: None,
            parent: None,
            live: false,
            bounds: BoundsCache { dirty: true, ..BoundsCache::default() },
            pick_mask: PickMask::all(),
            capability: kind.capability(),
            kind,
        }
    }

    /// Optional debug name
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Parent back-reference; `None` for roots, detached nodes and shared groups
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Whether the node is attached beneath a live scene root
    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Whether bounds are derived from children rather than set explicitly
    pub fn has_implicit_bounds(&self) -> bool {
        self.bounds.explicit.is_none()
    }

    /// Whether this node is, or has below it, a marker group
    ///
    /// Such nodes are never pruned by bounds, since marker children are
    /// placed relative to the viewer.
    pub fn contains_marker(&self) -> bool {
        self.bounds.contains_marker
    }

    /// Pick categories this node answers to
    pub fn pick_mask(&self) -> PickMask {
        self.pick_mask
    }

    /// Traversal capability
    pub fn capability(&self) -> Capability {
        self.capability
    }

    /// Node kind and its data
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Children, empty for leaves and links
    pub fn children(&self) -> &[NodeId] {
        self.kind.group_data().map_or(&[], Group::children)
    }
}
