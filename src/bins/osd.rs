//! On-screen display bin.

use super::{ChainBuilder, RgbaColor};
use crate::element::PropertyValue;
use crate::error::{Error, Result};
use crate::graph::{Graph, NodeId};
use std::collections::BTreeMap;

/// Clock overlay settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ClockSettings {
    /// Draw the clock.
    pub enabled: bool,
    /// Horizontal offset in pixels.
    pub offset_x: u32,
    /// Vertical offset in pixels.
    pub offset_y: u32,
    /// Font name.
    pub font: String,
    /// Font size.
    pub font_size: u32,
    /// Text color.
    pub color: RgbaColor,
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            offset_x: 0,
            offset_y: 0,
            font: "Serif".to_string(),
            font_size: 12,
            color: RgbaColor::white(),
        }
    }
}

/// Source crop rectangle applied before drawing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CropRect {
    /// Left edge.
    pub left: u32,
    /// Top edge.
    pub top: u32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

impl CropRect {
    fn to_property(self) -> String {
        format!("{}:{}:{}:{}", self.left, self.top, self.width, self.height)
    }
}

/// A detected object as seen by the redaction pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedObject {
    /// Detector class of the object.
    pub class_id: i32,
    /// Background fill of the object's box, if any.
    pub background: Option<RgbaColor>,
}

impl DetectedObject {
    /// An object of `class_id` with no background fill.
    pub fn new(class_id: i32) -> Self {
        Self {
            class_id,
            background: None,
        }
    }
}

/// `queue → nvvideoconvert → queue → nvdsosd`.
#[derive(Debug)]
pub struct OsdBin {
    bin: NodeId,
    converter: NodeId,
    osd: NodeId,
    clock: ClockSettings,
    crop: CropRect,
    gpu_id: u32,
    stream_id: Option<u32>,
    redaction_enabled: bool,
    redaction_classes: BTreeMap<i32, RgbaColor>,
}

impl OsdBin {
    /// Build the bin. The clock settings start at their defaults with
    /// `clock_enabled` applied.
    pub fn new(graph: &mut Graph, name: &str, clock_enabled: bool) -> Result<Self> {
        let mut builder = ChainBuilder::new(graph, name)?;
        builder.element("queue", "queue")?;
        let converter = builder.element("nvvideoconvert", "vidconv")?;
        builder.element("queue", "convqueue")?;
        let osd = builder.element("nvdsosd", "osd")?;

        let clock = ClockSettings {
            enabled: clock_enabled,
            ..Default::default()
        };
        apply_clock(builder.graph(), osd, &clock)?;
        let bin = builder.finish()?;

        Ok(Self {
            bin,
            converter,
            osd,
            clock,
            crop: CropRect::default(),
            gpu_id: 0,
            stream_id: None,
            redaction_enabled: false,
            redaction_classes: BTreeMap::new(),
        })
    }

    /// The bin node.
    pub fn bin(&self) -> NodeId {
        self.bin
    }

    /// Current clock settings.
    pub fn clock(&self) -> &ClockSettings {
        &self.clock
    }

    /// Show or hide the clock.
    pub fn set_clock_enabled(&mut self, graph: &mut Graph, enabled: bool) -> Result<()> {
        graph.set_attribute(self.osd, "display-clock", enabled)?;
        self.clock.enabled = enabled;
        Ok(())
    }

    /// Move the clock. Both offsets change or neither does.
    pub fn set_clock_offsets(&mut self, graph: &mut Graph, x: u32, y: u32) -> Result<()> {
        graph.set_attribute(self.osd, "x-clock-offset", x)?;
        if let Err(e) = graph.set_attribute(self.osd, "y-clock-offset", y) {
            restore(graph, self.osd, "x-clock-offset", self.clock.offset_x);
            return Err(e);
        }
        self.clock.offset_x = x;
        self.clock.offset_y = y;
        Ok(())
    }

    /// Change the clock font. Name and size change together or not at all.
    pub fn set_clock_font(&mut self, graph: &mut Graph, font: &str, size: u32) -> Result<()> {
        graph.set_attribute(self.osd, "clock-font", font)?;
        if let Err(e) = graph.set_attribute(self.osd, "clock-font-size", size) {
            restore(graph, self.osd, "clock-font", self.clock.font.as_str());
            return Err(e);
        }
        self.clock.font = font.to_string();
        self.clock.font_size = size;
        Ok(())
    }

    /// Change the clock color.
    pub fn set_clock_color(&mut self, graph: &mut Graph, color: RgbaColor) -> Result<()> {
        graph.set_attribute(self.osd, "clock-color", color.to_rgba_u32())?;
        self.clock.color = color;
        Ok(())
    }

    /// Current crop rectangle.
    pub fn crop(&self) -> CropRect {
        self.crop
    }

    /// Crop the incoming frames on the converter.
    pub fn set_crop(&mut self, graph: &mut Graph, crop: CropRect) -> Result<()> {
        graph.set_attribute(self.converter, "src-crop", crop.to_property())?;
        self.crop = crop;
        Ok(())
    }

    /// GPU used by the converter and the display element.
    pub fn gpu_id(&self) -> u32 {
        self.gpu_id
    }

    /// Move the converter and the display element to another GPU.
    pub fn set_gpu_id(&mut self, graph: &mut Graph, gpu_id: u32) -> Result<()> {
        graph.set_attribute(self.converter, "gpu-id", gpu_id)?;
        if let Err(e) = graph.set_attribute(self.osd, "gpu-id", gpu_id) {
            restore(graph, self.converter, "gpu-id", self.gpu_id);
            return Err(e);
        }
        self.gpu_id = gpu_id;
        Ok(())
    }

    /// Stream this display is bound to, if any.
    pub fn stream_id(&self) -> Option<u32> {
        self.stream_id
    }

    /// Bind this display to a stream.
    pub fn set_stream_id(&mut self, stream_id: Option<u32>) {
        self.stream_id = stream_id;
    }

    /// Whether redaction is on.
    pub fn redaction_enabled(&self) -> bool {
        self.redaction_enabled
    }

    /// Turn redaction on or off.
    pub fn set_redaction_enabled(&mut self, enabled: bool) {
        self.redaction_enabled = enabled;
    }

    /// Paint objects of `class_id` with `color` when redacting.
    pub fn add_redaction_class(&mut self, class_id: i32, color: RgbaColor) -> Result<()> {
        if self.redaction_classes.contains_key(&class_id) {
            return Err(Error::RedactionClassExists(class_id));
        }
        self.redaction_classes.insert(class_id, color);
        Ok(())
    }

    /// Stop redacting `class_id`.
    pub fn remove_redaction_class(&mut self, class_id: i32) -> Result<()> {
        self.redaction_classes
            .remove(&class_id)
            .map(|_| ())
            .ok_or(Error::RedactionClassNotFound(class_id))
    }

    /// Registered redaction classes and their colors.
    pub fn redaction_classes(&self) -> impl Iterator<Item = (i32, RgbaColor)> + '_ {
        self.redaction_classes.iter().map(|(&id, &color)| (id, color))
    }

    /// Fill the background of every object whose class is registered.
    /// Returns the number of objects painted; nothing is painted while
    /// redaction is off.
    pub fn redact(&self, objects: &mut [DetectedObject]) -> usize {
        if !self.redaction_enabled {
            return 0;
        }
        let mut painted = 0;
        for object in objects.iter_mut() {
            if let Some(&color) = self.redaction_classes.get(&object.class_id) {
                object.background = Some(color);
                painted += 1;
            }
        }
        painted
    }
}

/// Put an attribute back after a paired write failed halfway.
fn restore(graph: &mut Graph, id: NodeId, name: &str, previous: impl Into<PropertyValue>) {
    if let Err(e) = graph.set_attribute(id, name, previous) {
        tracing::warn!(property = name, error = %e, "attribute left half-updated");
    }
}

fn apply_clock(graph: &mut Graph, osd: NodeId, clock: &ClockSettings) -> Result<()> {
    graph.set_attribute(osd, "display-clock", clock.enabled)?;
    graph.set_attribute(osd, "clock-font", clock.font.as_str())?;
    graph.set_attribute(osd, "clock-font-size", clock.font_size)?;
    graph.set_attribute(osd, "x-clock-offset", clock.offset_x)?;
    graph.set_attribute(osd, "y-clock-offset", clock.offset_y)?;
    graph.set_attribute(osd, "clock-color", clock.color.to_rgba_u32())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;
    use std::sync::Arc;

    fn graph() -> Graph {
        Graph::new(Arc::new(MemoryEngine::new()))
    }

    #[test]
    fn test_osd_structure() {
        let mut g = graph();
        let osd = OsdBin::new(&mut g, "osd", true).unwrap();

        let names: Vec<_> = g
            .children(osd.bin())
            .into_iter()
            .filter_map(|c| g.name(c).map(str::to_string))
            .collect();
        assert_eq!(names, ["osd-queue", "osd-vidconv", "osd-convqueue", "osd-osd"]);
        assert_eq!(g.ghost_pads(osd.bin()), ["sink", "src"]);
        assert!(!g.is_linked(osd.bin()));
        assert!(g.link_all(osd.bin()));
        assert_eq!(
            g.attribute(osd.osd, "display-clock"),
            Some(PropertyValue::UInt(1))
        );
    }

    #[test]
    fn test_clock_and_crop_written_through() {
        let mut g = graph();
        let mut osd = OsdBin::new(&mut g, "osd", false).unwrap();

        osd.set_clock_offsets(&mut g, 10, 20).unwrap();
        osd.set_clock_color(&mut g, RgbaColor::new(1.0, 0.0, 0.0, 1.0).unwrap())
            .unwrap();
        osd.set_crop(
            &mut g,
            CropRect {
                left: 1,
                top: 2,
                width: 640,
                height: 480,
            },
        )
        .unwrap();
        osd.set_gpu_id(&mut g, 1).unwrap();

        assert_eq!(osd.clock().offset_x, 10);
        assert_eq!(
            g.attribute(osd.osd, "clock-color"),
            Some(PropertyValue::UInt(0xFF00_00FF))
        );
        assert_eq!(
            g.attribute(osd.converter, "src-crop"),
            Some(PropertyValue::Text("1:2:640:480".to_string()))
        );
        assert_eq!(g.attribute(osd.converter, "gpu-id"), Some(PropertyValue::UInt(1)));
    }

    #[test]
    fn test_failed_clock_update_keeps_both_attributes() {
        let engine = Arc::new(MemoryEngine::new());
        let mut g = Graph::new(engine.clone());
        let mut osd = OsdBin::new(&mut g, "osd", true).unwrap();
        engine.refuse_property("osd-osd", "y-clock-offset");
        engine.refuse_property("osd-osd", "clock-font-size");

        assert!(matches!(osd.set_clock_offsets(&mut g, 10, 20), Err(Error::Engine(_))));
        assert_eq!(osd.clock().offset_x, 0);
        assert_eq!(g.attribute(osd.osd, "x-clock-offset"), Some(PropertyValue::UInt(0)));

        assert!(osd.set_clock_font(&mut g, "Mono", 20).is_err());
        assert_eq!(osd.clock().font, "Serif");
        assert_eq!(
            g.attribute(osd.osd, "clock-font"),
            Some(PropertyValue::Text("Serif".to_string()))
        );
        assert_eq!(g.attribute(osd.osd, "clock-font-size"), Some(PropertyValue::UInt(12)));
    }

    #[test]
    fn test_failed_gpu_move_restores_converter() {
        let engine = Arc::new(MemoryEngine::new());
        let mut g = Graph::new(engine.clone());
        let mut osd = OsdBin::new(&mut g, "osd", false).unwrap();
        osd.set_gpu_id(&mut g, 1).unwrap();
        engine.refuse_property("osd-osd", "gpu-id");

        assert!(osd.set_gpu_id(&mut g, 2).is_err());
        assert_eq!(osd.gpu_id(), 1);
        assert_eq!(g.attribute(osd.converter, "gpu-id"), Some(PropertyValue::UInt(1)));
        assert_eq!(g.attribute(osd.osd, "gpu-id"), Some(PropertyValue::UInt(1)));
    }

    #[test]
    fn test_redaction_classes() {
        let mut g = graph();
        let mut osd = OsdBin::new(&mut g, "osd", false).unwrap();
        let black = RgbaColor::new(0.0, 0.0, 0.0, 1.0).unwrap();

        osd.add_redaction_class(2, black).unwrap();
        assert_eq!(
            osd.add_redaction_class(2, black).unwrap_err(),
            Error::RedactionClassExists(2)
        );

        let mut objects = vec![DetectedObject::new(2), DetectedObject::new(3)];
        assert_eq!(osd.redact(&mut objects), 0);

        osd.set_redaction_enabled(true);
        assert_eq!(osd.redact(&mut objects), 1);
        assert_eq!(objects[0].background, Some(black));
        assert_eq!(objects[1].background, None);

        osd.remove_redaction_class(2).unwrap();
        assert_eq!(
            osd.remove_redaction_class(2).unwrap_err(),
            Error::RedactionClassNotFound(2)
        );
    }

    #[test]
    fn test_failed_build_leaves_nothing() {
        let engine = Arc::new(MemoryEngine::new());
        engine.refuse_factory("nvdsosd");
        let mut g = Graph::new(engine.clone());

        assert!(OsdBin::new(&mut g, "osd", false).is_err());
        assert!(g.is_empty());
        assert_eq!(engine.object_count(), 0);
    }
}
