//! Named components and pipelines.
//!
//! A [`Registry`] is the flat, name-addressed surface a configuration loader
//! or command line drives: create components, create pipelines, add
//! components to pipelines, link, play and tear down. It owns one shared
//! [`Graph`] that every component and pipeline lives in. Registries are
//! plain values; nothing is global.

use crate::bins::{OsdBin, PrimaryGieBin, ReporterBin, SourceBin, UriSettings};
use crate::element::PropertyValue;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::graph::{Graph, NodeId, SharedGraph};
use crate::pipeline::{ControllerConfig, PipelineController, PipelineState, StateChangeListener};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, MutexGuard, PoisonError};

/// A named building block a pipeline can be assembled from.
#[derive(Debug)]
pub enum Component {
    /// A bare element.
    Element(NodeId),
    /// An empty bin to be filled by the caller.
    Bin(NodeId),
    /// A camera or URI source.
    Source(SourceBin),
    /// An on-screen display.
    Osd(OsdBin),
    /// A reporter tap.
    Reporter(ReporterBin),
    /// A primary detector.
    PrimaryGie(PrimaryGieBin),
}

impl Component {
    /// The graph node that joins pipelines.
    pub fn node(&self) -> NodeId {
        match self {
            Component::Element(id) | Component::Bin(id) => *id,
            Component::Source(source) => source.bin(),
            Component::Osd(osd) => osd.bin(),
            Component::Reporter(reporter) => reporter.bin(),
            Component::PrimaryGie(gie) => gie.bin(),
        }
    }

    /// Short label of the component type.
    pub fn type_label(&self) -> &'static str {
        match self {
            Component::Element(_) => "element",
            Component::Bin(_) => "bin",
            Component::Source(_) => "source",
            Component::Osd(_) => "osd",
            Component::Reporter(_) => "reporter",
            Component::PrimaryGie(_) => "primary-gie",
        }
    }
}

/// Registry of named components and pipelines sharing one graph.
#[derive(Debug)]
pub struct Registry {
    pipelines: BTreeMap<String, PipelineController>,
    components: BTreeMap<String, Component>,
    membership: HashMap<String, String>,
    graph: SharedGraph,
    config: ControllerConfig,
}

impl Registry {
    /// Create an empty registry on top of `engine`.
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self::with_config(engine, ControllerConfig::default())
    }

    /// Create an empty registry whose pipelines use `config`.
    pub fn with_config(engine: Arc<dyn Engine>, config: ControllerConfig) -> Self {
        Self {
            pipelines: BTreeMap::new(),
            components: BTreeMap::new(),
            membership: HashMap::new(),
            graph: Graph::new(engine).into_shared(),
            config,
        }
    }

    /// The graph every component lives in.
    pub fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    fn graph_lock(&self) -> MutexGuard<'_, Graph> {
        self.graph.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_unique_component(&self, name: &str) -> Result<()> {
        if self.components.contains_key(name) {
            return Err(Error::ComponentNameNotUnique(name.to_string()));
        }
        Ok(())
    }

    fn insert_component(&mut self, name: &str, component: Component) {
        tracing::debug!(component = name, kind = component.type_label(), "component created");
        self.components.insert(name.to_string(), component);
    }

    /// Create a bare element from `factory`.
    pub fn element_new(&mut self, name: &str, factory: &str) -> Result<()> {
        self.ensure_unique_component(name)?;
        let id = self.graph_lock().new_element(factory, name)?;
        self.insert_component(name, Component::Element(id));
        Ok(())
    }

    /// Create an empty bin.
    pub fn bin_new(&mut self, name: &str) -> Result<()> {
        self.ensure_unique_component(name)?;
        let id = self.graph_lock().new_bin(name)?;
        self.insert_component(name, Component::Bin(id));
        Ok(())
    }

    /// Create a CSI camera source.
    pub fn source_csi_new(
        &mut self,
        name: &str,
        width: u32,
        height: u32,
        fps_n: u32,
        fps_d: u32,
    ) -> Result<()> {
        self.ensure_unique_component(name)?;
        let source = SourceBin::new_csi(&mut self.graph_lock(), name, width, height, fps_n, fps_d)?;
        self.insert_component(name, Component::Source(source));
        Ok(())
    }

    /// Create a URI source.
    pub fn source_uri_new(&mut self, name: &str, settings: UriSettings) -> Result<()> {
        self.ensure_unique_component(name)?;
        let source = SourceBin::new_uri(&mut self.graph_lock(), name, settings)?;
        self.insert_component(name, Component::Source(source));
        Ok(())
    }

    /// Create an on-screen display.
    pub fn osd_new(&mut self, name: &str, clock_enabled: bool) -> Result<()> {
        self.ensure_unique_component(name)?;
        let osd = OsdBin::new(&mut self.graph_lock(), name, clock_enabled)?;
        self.insert_component(name, Component::Osd(osd));
        Ok(())
    }

    /// Create a reporter.
    pub fn reporter_new(&mut self, name: &str) -> Result<()> {
        self.ensure_unique_component(name)?;
        let reporter = ReporterBin::new(&mut self.graph_lock(), name)?;
        self.insert_component(name, Component::Reporter(reporter));
        Ok(())
    }

    /// Create a primary detector.
    pub fn primary_gie_new(
        &mut self,
        name: &str,
        infer_config_file: &str,
        model_engine_file: &str,
        interval: u32,
        unique_id: u32,
    ) -> Result<()> {
        self.ensure_unique_component(name)?;
        let gie = PrimaryGieBin::new(
            &mut self.graph_lock(),
            name,
            infer_config_file,
            model_engine_file,
            interval,
            unique_id,
        )?;
        self.insert_component(name, Component::PrimaryGie(gie));
        Ok(())
    }

    /// Look up a component.
    pub fn component(&self, name: &str) -> Result<&Component> {
        self.components
            .get(name)
            .ok_or_else(|| Error::ComponentNotFound(name.to_string()))
    }

    /// Look up a component for modification, together with the graph lock
    /// its mutators need.
    pub fn component_mut(&mut self, name: &str) -> Result<(&mut Component, MutexGuard<'_, Graph>)> {
        let graph = self.graph.lock().unwrap_or_else(PoisonError::into_inner);
        let component = self
            .components
            .get_mut(name)
            .ok_or_else(|| Error::ComponentNotFound(name.to_string()))?;
        Ok((component, graph))
    }

    /// Pipeline a component currently belongs to.
    pub fn component_pipeline(&self, name: &str) -> Option<&str> {
        self.membership.get(name).map(String::as_str)
    }

    /// Delete a component that is not part of any pipeline.
    pub fn component_delete(&mut self, name: &str) -> Result<()> {
        let node = self.component(name)?.node();
        if self.membership.contains_key(name) {
            return Err(Error::ComponentInUse(name.to_string()));
        }
        self.graph_lock().destroy(node)?;
        self.components.remove(name);
        tracing::debug!(component = name, "component deleted");
        Ok(())
    }

    /// Delete every component. Fails without deleting anything if one of
    /// them is part of a pipeline.
    pub fn component_delete_all(&mut self) -> Result<()> {
        if let Some(name) = self.components.keys().find(|n| self.membership.contains_key(*n)) {
            return Err(Error::ComponentInUse(name.clone()));
        }
        let names: Vec<String> = self.components.keys().cloned().collect();
        for name in names {
            self.component_delete(&name)?;
        }
        Ok(())
    }

    /// Number of components.
    pub fn component_list_size(&self) -> usize {
        self.components.len()
    }

    /// Component names, sorted.
    pub fn component_list_all(&self) -> Vec<String> {
        self.components.keys().cloned().collect()
    }

    /// Set an attribute on a component's node.
    pub fn set_attribute(
        &mut self,
        component: &str,
        property: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<()> {
        let node = self.component(component)?.node();
        self.graph_lock().set_attribute(node, property, value)
    }

    /// Create an empty pipeline.
    pub fn pipeline_new(&mut self, name: &str) -> Result<()> {
        if self.pipelines.contains_key(name) {
            return Err(Error::PipelineNameNotUnique(name.to_string()));
        }
        let controller = PipelineController::new(self.graph.clone(), name, self.config.clone())?;
        self.pipelines.insert(name.to_string(), controller);
        Ok(())
    }

    /// Look up a pipeline.
    pub fn pipeline(&self, name: &str) -> Result<&PipelineController> {
        self.pipelines
            .get(name)
            .ok_or_else(|| Error::PipelineNotFound(name.to_string()))
    }

    /// Delete a pipeline. Its components are released back to the registry
    /// and can join another pipeline.
    pub fn pipeline_delete(&mut self, name: &str) -> Result<()> {
        let controller = self
            .pipelines
            .remove(name)
            .ok_or_else(|| Error::PipelineNotFound(name.to_string()))?;
        drop(controller);

        let members: Vec<String> = self
            .membership
            .iter()
            .filter(|(_, pipeline)| pipeline.as_str() == name)
            .map(|(component, _)| component.clone())
            .collect();
        for component in members {
            self.membership.remove(&component);
            self.clear_sensor_id(&component);
        }
        tracing::debug!(pipeline = name, "pipeline deleted");
        Ok(())
    }

    /// Delete every pipeline.
    pub fn pipeline_delete_all(&mut self) {
        let names: Vec<String> = self.pipelines.keys().cloned().collect();
        for name in names {
            let _ = self.pipeline_delete(&name);
        }
    }

    /// Number of pipelines.
    pub fn pipeline_list_size(&self) -> usize {
        self.pipelines.len()
    }

    /// Pipeline names, sorted.
    pub fn pipeline_list_all(&self) -> Vec<String> {
        self.pipelines.keys().cloned().collect()
    }

    fn lowest_free_sensor_id(&self, pipeline: &str) -> u32 {
        let taken: BTreeSet<u32> = self
            .membership
            .iter()
            .filter(|(_, p)| p.as_str() == pipeline)
            .filter_map(|(c, _)| match self.components.get(c) {
                Some(Component::Source(source)) => source.sensor_id(),
                _ => None,
            })
            .collect();
        (0..).find(|id| !taken.contains(id)).unwrap_or(0)
    }

    fn clear_sensor_id(&mut self, component: &str) {
        let mut graph = self.graph.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(Component::Source(source)) = self.components.get_mut(component) {
            let _ = source.set_sensor_id(&mut graph, None);
        }
    }

    /// Add a component to a pipeline's root bin.
    ///
    /// A source gets the lowest sensor id not used by another source of the
    /// same pipeline.
    pub fn pipeline_component_add(&mut self, pipeline: &str, component: &str) -> Result<()> {
        let root = self.pipeline(pipeline)?.root();
        let _span = self.config.tracing.node(pipeline, component).entered();
        let node = self.component(component)?.node();
        if self.membership.contains_key(component) {
            return Err(Error::ComponentInUse(component.to_string()));
        }
        self.pipeline(pipeline)?.add_child(node)?;

        let sensor_id = self.lowest_free_sensor_id(pipeline);
        let mut graph = self.graph.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(Component::Source(source)) = self.components.get_mut(component)
            && let Err(e) = source.set_sensor_id(&mut graph, Some(sensor_id))
        {
            let _ = graph.remove_child(root, node);
            return Err(e);
        }
        drop(graph);

        self.membership
            .insert(component.to_string(), pipeline.to_string());
        tracing::debug!(pipeline, component, "component added to pipeline");
        Ok(())
    }

    /// Remove a component from a pipeline.
    pub fn pipeline_component_remove(&mut self, pipeline: &str, component: &str) -> Result<()> {
        let controller = self.pipeline(pipeline)?;
        let node = self.component(component)?.node();
        if self.component_pipeline(component) != Some(pipeline) {
            return Err(Error::NotAChild {
                parent: pipeline.to_string(),
                child: component.to_string(),
            });
        }
        controller.remove_child(node)?;

        self.membership.remove(component);
        self.clear_sensor_id(component);
        tracing::debug!(pipeline, component, "component removed from pipeline");
        Ok(())
    }

    /// Link a pipeline's components in the order they were added.
    pub fn pipeline_link_all(&self, pipeline: &str) -> Result<bool> {
        Ok(self.pipeline(pipeline)?.link_all())
    }

    /// Unlink a pipeline's components.
    pub fn pipeline_unlink_all(&self, pipeline: &str) -> Result<()> {
        self.pipeline(pipeline)?.unlink_all();
        Ok(())
    }

    /// Request `Playing`.
    pub fn pipeline_play(&self, pipeline: &str) -> Result<bool> {
        Ok(self.pipeline(pipeline)?.play())
    }

    /// Request `Paused`.
    pub fn pipeline_pause(&self, pipeline: &str) -> Result<bool> {
        Ok(self.pipeline(pipeline)?.pause())
    }

    /// Force `Null`.
    pub fn pipeline_stop(&self, pipeline: &str) -> Result<bool> {
        Ok(self.pipeline(pipeline)?.stop())
    }

    /// Last confirmed state.
    pub fn pipeline_state(&self, pipeline: &str) -> Result<PipelineState> {
        Ok(self.pipeline(pipeline)?.state())
    }

    /// Dispatch a pipeline's queued bus messages.
    pub fn pipeline_dispatch_pending(&self, pipeline: &str) -> Result<usize> {
        Ok(self.pipeline(pipeline)?.dispatch_pending())
    }

    /// Register a state-change listener on a pipeline.
    pub fn pipeline_state_change_listener_add(
        &self,
        pipeline: &str,
        listener: StateChangeListener,
    ) -> Result<()> {
        self.pipeline(pipeline)?.add_state_change_listener(listener)
    }

    /// Unregister a state-change listener.
    pub fn pipeline_state_change_listener_remove(
        &self,
        pipeline: &str,
        listener: &StateChangeListener,
    ) -> Result<()> {
        self.pipeline(pipeline)?.remove_state_change_listener(listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;

    fn registry() -> Registry {
        Registry::with_config(Arc::new(MemoryEngine::new()), ControllerConfig::testing())
    }

    #[test]
    fn test_component_names_unique() {
        let mut reg = registry();
        reg.element_new("q", "queue").unwrap();
        assert_eq!(
            reg.bin_new("q").unwrap_err(),
            Error::ComponentNameNotUnique("q".to_string())
        );
        assert_eq!(reg.component_list_size(), 1);
        assert_eq!(reg.component("q").unwrap().type_label(), "element");
    }

    #[test]
    fn test_component_in_use() {
        let mut reg = registry();
        reg.pipeline_new("p").unwrap();
        reg.reporter_new("reporter").unwrap();
        reg.pipeline_component_add("p", "reporter").unwrap();

        assert_eq!(
            reg.component_delete("reporter").unwrap_err(),
            Error::ComponentInUse("reporter".to_string())
        );
        assert!(reg.component_delete_all().is_err());

        reg.pipeline_component_remove("p", "reporter").unwrap();
        reg.component_delete("reporter").unwrap();
        assert_eq!(reg.component_list_size(), 0);
    }

    #[test]
    fn test_sensor_ids_lowest_free() {
        let mut reg = registry();
        reg.pipeline_new("p").unwrap();
        for name in ["a", "b", "c"] {
            reg.source_uri_new(name, UriSettings::new(format!("rtsp://{name}")))
                .unwrap();
            reg.pipeline_component_add("p", name).unwrap();
        }
        let sensor = |reg: &Registry, name: &str| match reg.component(name).unwrap() {
            Component::Source(s) => s.sensor_id(),
            _ => None,
        };
        assert_eq!(sensor(&reg, "c"), Some(2));

        reg.pipeline_component_remove("p", "b").unwrap();
        assert_eq!(sensor(&reg, "b"), None);

        reg.source_uri_new("d", UriSettings::new("rtsp://d")).unwrap();
        reg.pipeline_component_add("p", "d").unwrap();
        assert_eq!(sensor(&reg, "d"), Some(1));
    }

    #[test]
    fn test_pipeline_delete_releases_components() {
        let mut reg = registry();
        reg.pipeline_new("p").unwrap();
        reg.element_new("q", "queue").unwrap();
        reg.pipeline_component_add("p", "q").unwrap();

        reg.pipeline_delete("p").unwrap();
        assert_eq!(reg.component_pipeline("q"), None);
        reg.component_delete("q").unwrap();
        assert_eq!(
            reg.pipeline_delete("p").unwrap_err(),
            Error::PipelineNotFound("p".to_string())
        );
    }
}
