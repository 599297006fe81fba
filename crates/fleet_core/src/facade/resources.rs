//! Facade operations on blocks, groups, static routes, visual layouts and
//! the two resource relations.
//!
//! Resource expansion (block closure) and effective resources (attached-
//! resource closure) traverse two distinct relations and are deliberately
//! kept apart.

use std::collections::BTreeSet;

use serde_json::Value;

use super::{
    Model, NAME_PREFIX_BLOCK, NAME_PREFIX_GROUP, NAME_PREFIX_STATIC_ROUTE,
    NAME_PREFIX_VISUAL_LAYOUT, NAME_SUFFIX_DIGITS,
};
use crate::error::{KernelError, Result};
use crate::model::{Block, Group, Location, Path, Point, StaticRoute, VisualLayout};
use crate::refs::{ObjectRef, TypedRef};

impl Model {
    // -----------------------------------------------------------------------
    // Blocks
    // -----------------------------------------------------------------------

    pub fn create_block(&mut self) -> Result<TypedRef<Block>> {
        let name = self
            .pool()
            .unique_name(NAME_PREFIX_BLOCK, NAME_SUFFIX_DIGITS);
        self.pool_mut().create(name, Block::default())
    }

    /// Members must be resources (points, paths or locations).
    pub fn add_block_member(&mut self, block: &TypedRef<Block>, member: &ObjectRef) -> Result<()> {
        self.require(block)?;
        self.require_resource(member)?;
        let member = member.clone();
        self.pool_mut().modify(block, move |b| {
            if !b.members.iter().any(|m| m.id == member.id) {
                b.members.push(member);
            }
        })
    }

    pub fn remove_block_member(
        &mut self,
        block: &TypedRef<Block>,
        member: &ObjectRef,
    ) -> Result<()> {
        self.require(block)?;
        let member_id = member.id;
        self.pool_mut().modify(block, move |b| {
            b.members.retain(|m| m.id != member_id);
        })
    }

    // -----------------------------------------------------------------------
    // Groups
    // -----------------------------------------------------------------------

    pub fn create_group(&mut self) -> Result<TypedRef<Group>> {
        let name = self
            .pool()
            .unique_name(NAME_PREFIX_GROUP, NAME_SUFFIX_DIGITS);
        self.pool_mut().create(name, Group::default())
    }

    /// Group members may be objects of any kind.
    pub fn add_group_member(&mut self, group: &TypedRef<Group>, member: &ObjectRef) -> Result<()> {
        self.require(group)?;
        if !self.pool().contains_id(member.id) {
            return Err(KernelError::ObjectUnknown(member.name.clone()));
        }
        let member = member.clone();
        self.pool_mut().modify(group, move |g| {
            if !g.members.iter().any(|m| m.id == member.id) {
                g.members.push(member);
            }
        })
    }

    pub fn remove_group_member(
        &mut self,
        group: &TypedRef<Group>,
        member: &ObjectRef,
    ) -> Result<()> {
        self.require(group)?;
        let member_id = member.id;
        self.pool_mut().modify(group, move |g| {
            g.members.retain(|m| m.id != member_id);
        })
    }

    // -----------------------------------------------------------------------
    // Static routes
    // -----------------------------------------------------------------------

    pub fn create_static_route(&mut self) -> Result<TypedRef<StaticRoute>> {
        let name = self
            .pool()
            .unique_name(NAME_PREFIX_STATIC_ROUTE, NAME_SUFFIX_DIGITS);
        self.pool_mut().create(name, StaticRoute::default())
    }

    pub fn add_static_route_hop(
        &mut self,
        route: &TypedRef<StaticRoute>,
        hop: &TypedRef<Point>,
    ) -> Result<()> {
        self.require(route)?;
        self.require(hop)?;
        let hop = hop.clone();
        self.pool_mut().modify(route, move |r| r.hops.push(hop))
    }

    pub fn clear_static_route_hops(&mut self, route: &TypedRef<StaticRoute>) -> Result<()> {
        self.require(route)?;
        self.pool_mut().modify(route, |r| r.hops.clear())
    }

    // -----------------------------------------------------------------------
    // Visual layouts
    // -----------------------------------------------------------------------

    pub fn create_visual_layout(&mut self) -> Result<TypedRef<VisualLayout>> {
        let name = self
            .pool()
            .unique_name(NAME_PREFIX_VISUAL_LAYOUT, NAME_SUFFIX_DIGITS);
        self.pool_mut().create(name, VisualLayout::default())
    }

    pub fn set_visual_layout_scale_x(
        &mut self,
        layout: &TypedRef<VisualLayout>,
        scale: f64,
    ) -> Result<()> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(KernelError::IllegalArgument(format!(
                "layout scale {scale} must be positive"
            )));
        }
        self.require(layout)?;
        self.pool_mut().modify(layout, |l| l.scale_x = scale)
    }

    pub fn set_visual_layout_scale_y(
        &mut self,
        layout: &TypedRef<VisualLayout>,
        scale: f64,
    ) -> Result<()> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(KernelError::IllegalArgument(format!(
                "layout scale {scale} must be positive"
            )));
        }
        self.require(layout)?;
        self.pool_mut().modify(layout, |l| l.scale_y = scale)
    }

    pub fn set_visual_layout_colors(
        &mut self,
        layout: &TypedRef<VisualLayout>,
        colors: std::collections::BTreeMap<String, u32>,
    ) -> Result<()> {
        self.require(layout)?;
        self.pool_mut().modify(layout, move |l| l.colors = colors)
    }

    /// Layout elements are opaque to the kernel and stored verbatim.
    pub fn set_visual_layout_elements(
        &mut self,
        layout: &TypedRef<VisualLayout>,
        elements: Vec<Value>,
    ) -> Result<()> {
        self.require(layout)?;
        self.pool_mut()
            .modify(layout, move |l| l.elements = elements)
    }

    pub fn set_visual_layout_view_bookmarks(
        &mut self,
        layout: &TypedRef<VisualLayout>,
        bookmarks: Vec<Value>,
    ) -> Result<()> {
        self.require(layout)?;
        self.pool_mut()
            .modify(layout, move |l| l.view_bookmarks = bookmarks)
    }

    // -----------------------------------------------------------------------
    // Resource relations
    // -----------------------------------------------------------------------

    /// Attaches `attachment` to `resource`: allocating `resource` implicitly
    /// allocates `attachment` too.
    pub fn attach_resource(&mut self, resource: &ObjectRef, attachment: &ObjectRef) -> Result<()> {
        let kind = self.require_resource(resource)?;
        self.require_resource(attachment)?;
        if resource.id == attachment.id {
            return Err(KernelError::IllegalArgument(format!(
                "cannot attach {} to itself",
                resource.name
            )));
        }
        let attachment = attachment.clone();
        match kind {
            crate::model::ObjectKind::Point => {
                self.pool_mut()
                    .modify(&resource.typed::<Point>(), move |p| {
                        if !p.attached_resources.iter().any(|a| a.id == attachment.id) {
                            p.attached_resources.push(attachment);
                        }
                    })
            }
            crate::model::ObjectKind::Path => {
                self.pool_mut()
                    .modify(&resource.typed::<Path>(), move |p| {
                        if !p.attached_resources.iter().any(|a| a.id == attachment.id) {
                            p.attached_resources.push(attachment);
                        }
                    })
            }
            _ => self
                .pool_mut()
                .modify(&resource.typed::<Location>(), move |l| {
                    if !l.attached_resources.iter().any(|a| a.id == attachment.id) {
                        l.attached_resources.push(attachment);
                    }
                }),
        }
    }

    pub fn detach_resource(&mut self, resource: &ObjectRef, attachment: &ObjectRef) -> Result<()> {
        let kind = self.require_resource(resource)?;
        let attachment_id = attachment.id;
        match kind {
            crate::model::ObjectKind::Point => {
                self.pool_mut()
                    .modify(&resource.typed::<Point>(), move |p| {
                        p.attached_resources.retain(|a| a.id != attachment_id);
                    })
            }
            crate::model::ObjectKind::Path => {
                self.pool_mut()
                    .modify(&resource.typed::<Path>(), move |p| {
                        p.attached_resources.retain(|a| a.id != attachment_id);
                    })
            }
            _ => self
                .pool_mut()
                .modify(&resource.typed::<Location>(), move |l| {
                    l.attached_resources.retain(|a| a.id != attachment_id);
                }),
        }
    }

    /// Refs to every resource object (points, paths, locations).
    pub(crate) fn resource_refs(&self) -> Vec<ObjectRef> {
        let mut refs: Vec<ObjectRef> = Vec::new();
        refs.extend(
            self.pool()
                .refs_of_kind::<Point>()
                .iter()
                .map(TypedRef::erased),
        );
        refs.extend(
            self.pool()
                .refs_of_kind::<Path>()
                .iter()
                .map(TypedRef::erased),
        );
        refs.extend(
            self.pool()
                .refs_of_kind::<Location>()
                .iter()
                .map(TypedRef::erased),
        );
        refs
    }

    pub(crate) fn attached_resources_of(&self, resource: &ObjectRef) -> Option<Vec<ObjectRef>> {
        if let Some(point) = self.pool().get(&resource.typed::<Point>()) {
            return Some(point.attached_resources.clone());
        }
        if let Some(path) = self.pool().get(&resource.typed::<Path>()) {
            return Some(path.attached_resources.clone());
        }
        if let Some(location) = self.pool().get(&resource.typed::<Location>()) {
            return Some(location.attached_resources.clone());
        }
        None
    }

    /// The input set plus, for every block containing any member of the set,
    /// all members of that block. Blocks may overlap; set semantics apply.
    pub fn expand_resources(&self, resources: &[ObjectRef]) -> Result<BTreeSet<ObjectRef>> {
        for resource in resources {
            self.require_resource(resource)?;
        }

        let mut expanded: BTreeSet<ObjectRef> = resources.iter().cloned().collect();
        for (_, block) in self.pool().objects_of_kind::<Block>() {
            let touches = block
                .members
                .iter()
                .any(|member| resources.iter().any(|r| r.id == member.id));
            if touches {
                expanded.extend(block.members.iter().cloned());
            }
        }
        Ok(expanded)
    }

    /// The input set plus every resource transitively reachable via the
    /// attached-resource relation.
    pub fn effective_resources(&self, resources: &[ObjectRef]) -> Result<BTreeSet<ObjectRef>> {
        for resource in resources {
            self.require_resource(resource)?;
        }

        let mut effective: BTreeSet<ObjectRef> = resources.iter().cloned().collect();
        let mut queue: Vec<ObjectRef> = resources.to_vec();
        while let Some(next) = queue.pop() {
            for attached in self.attached_resources_of(&next).unwrap_or_default() {
                if effective.insert(attached.clone()) {
                    queue.push(attached);
                }
            }
        }
        Ok(effective)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;

    fn model() -> Model {
        Model::new(EventBus::new())
    }

    #[test]
    fn expand_resources_pulls_in_whole_blocks() {
        let mut model = model();
        let a = model.create_point().expect("point");
        let b = model.create_point().expect("point");
        let c = model.create_point().expect("point");
        let d = model.create_point().expect("point");

        let block_one = model.create_block().expect("block");
        model.add_block_member(&block_one, &a.erased()).expect("member");
        model.add_block_member(&block_one, &b.erased()).expect("member");
        // Overlapping second block.
        let block_two = model.create_block().expect("block");
        model.add_block_member(&block_two, &b.erased()).expect("member");
        model.add_block_member(&block_two, &c.erased()).expect("member");

        let expanded = model.expand_resources(&[a.erased()]).expect("expand");
        assert!(expanded.contains(&a.erased()));
        assert!(expanded.contains(&b.erased()));
        assert!(
            !expanded.contains(&c.erased()),
            "one expansion step only pulls in blocks touching the input set"
        );
        assert!(!expanded.contains(&d.erased()));

        let expanded = model
            .expand_resources(&[a.erased(), b.erased()])
            .expect("expand");
        assert!(expanded.contains(&c.erased()));
    }

    #[test]
    fn effective_resources_follows_attachments_transitively() {
        let mut model = model();
        let a = model.create_point().expect("point");
        let b = model.create_point().expect("point");
        let c = model.create_point().expect("point");
        model.attach_resource(&a.erased(), &b.erased()).expect("attach");
        model.attach_resource(&b.erased(), &c.erased()).expect("attach");

        let effective = model.effective_resources(&[a.erased()]).expect("effective");
        assert_eq!(effective.len(), 3);
        assert!(effective.contains(&c.erased()));

        model.detach_resource(&a.erased(), &b.erased()).expect("detach");
        let effective = model.effective_resources(&[a.erased()]).expect("effective");
        assert_eq!(effective.len(), 1);
    }

    #[test]
    fn block_members_must_be_resources() {
        let mut model = model();
        let block = model.create_block().expect("block");
        let vehicle = model.create_vehicle().expect("vehicle");
        assert!(matches!(
            model.add_block_member(&block, &vehicle.erased()),
            Err(KernelError::IllegalArgument(_))
        ));
    }

    #[test]
    fn removing_a_resource_strips_it_from_blocks() {
        let mut model = model();
        let a = model.create_point().expect("point");
        let b = model.create_point().expect("point");
        let block = model.create_block().expect("block");
        model.add_block_member(&block, &a.erased()).expect("member");
        model.add_block_member(&block, &b.erased()).expect("member");

        model.remove_point(&a).expect("remove");
        let members = &model.pool().get(&block).expect("block").members;
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, b.id);
    }
}
