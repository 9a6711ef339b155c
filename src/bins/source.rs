//! Source bins: CSI camera and URI decode.

use super::ChainBuilder;
use crate::element::Caps;
use crate::error::{Error, Result};
use crate::graph::{Graph, NodeId};

/// Decoder settings of a URI source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriSettings {
    /// Location to decode.
    pub uri: String,
    /// CUDA decoder memory type.
    pub cudadec_mem_type: u32,
    /// Decode intra frames only.
    pub intra_decode: bool,
    /// Keep one frame out of this many; zero keeps all.
    pub drop_frame_interval: u32,
}

impl UriSettings {
    /// Settings for `uri` with decoder defaults.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            cudadec_mem_type: 0,
            intra_decode: false,
            drop_frame_interval: 0,
        }
    }
}

/// What feeds a [`SourceBin`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// On-board CSI camera.
    Csi {
        /// Frame width.
        width: u32,
        /// Frame height.
        height: u32,
        /// Frame rate numerator.
        fps_n: u32,
        /// Frame rate denominator.
        fps_d: u32,
    },
    /// Anything the URI decoder understands.
    Uri(UriSettings),
}

/// A stream source packaged as a bin with a single "src" ghost pad.
#[derive(Debug)]
pub struct SourceBin {
    bin: NodeId,
    source: NodeId,
    kind: SourceKind,
    sensor_id: Option<u32>,
    live: bool,
}

impl SourceBin {
    /// `nvarguscamerasrc → capsfilter`, constrained to NVMM frames of the
    /// given size and rate.
    pub fn new_csi(
        graph: &mut Graph,
        name: &str,
        width: u32,
        height: u32,
        fps_n: u32,
        fps_d: u32,
    ) -> Result<Self> {
        if width == 0 || height == 0 || fps_d == 0 {
            return Err(Error::InvalidValue(format!(
                "invalid camera mode {width}x{height}@{fps_n}/{fps_d}"
            )));
        }

        let mut builder = ChainBuilder::new(graph, name)?;
        let source = builder.element("nvarguscamerasrc", "src")?;
        let filter = builder.element("capsfilter", "caps")?;
        builder.graph().set_attribute(source, "bufapi-version", true)?;
        builder.graph().set_attribute(
            filter,
            "caps",
            Caps::nvmm_video(width, height, fps_n, fps_d).with_text("format", "NV12"),
        )?;
        let bin = builder.finish()?;

        Ok(Self {
            bin,
            source,
            kind: SourceKind::Csi {
                width,
                height,
                fps_n,
                fps_d,
            },
            sensor_id: None,
            live: true,
        })
    }

    /// A single `uridecodebin`. Anything but a local file counts as live.
    pub fn new_uri(graph: &mut Graph, name: &str, settings: UriSettings) -> Result<Self> {
        if settings.uri.is_empty() {
            return Err(Error::InvalidValue("empty uri".to_string()));
        }

        let mut builder = ChainBuilder::new(graph, name)?;
        let source = builder.element("uridecodebin", "decode")?;
        let g = builder.graph();
        g.set_attribute(source, "uri", settings.uri.as_str())?;
        g.set_attribute(source, "cudadec-memtype", settings.cudadec_mem_type)?;
        g.set_attribute(source, "intra-decode", settings.intra_decode)?;
        g.set_attribute(source, "drop-frame-interval", settings.drop_frame_interval)?;
        let bin = builder.finish()?;

        let live = !settings.uri.starts_with("file:");
        Ok(Self {
            bin,
            source,
            kind: SourceKind::Uri(settings),
            sensor_id: None,
            live,
        })
    }

    /// The bin node.
    pub fn bin(&self) -> NodeId {
        self.bin
    }

    /// What feeds this source.
    pub fn kind(&self) -> &SourceKind {
        &self.kind
    }

    /// Whether the source produces data in real time.
    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Sensor id assigned by the pipeline, if the source is in one.
    pub fn sensor_id(&self) -> Option<u32> {
        self.sensor_id
    }

    /// Assign or clear the sensor id. Camera sources also select that
    /// sensor natively.
    pub fn set_sensor_id(&mut self, graph: &mut Graph, sensor_id: Option<u32>) -> Result<()> {
        if let (SourceKind::Csi { .. }, Some(id)) = (&self.kind, sensor_id) {
            graph.set_attribute(self.source, "sensor-id", id)?;
        }
        self.sensor_id = sensor_id;
        Ok(())
    }

    /// Check if `parent` is the bin this source currently sits in.
    pub fn is_my_parent(&self, graph: &Graph, parent: NodeId) -> bool {
        graph.parent(self.bin) == Some(parent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::PropertyValue;
    use crate::engine::MemoryEngine;
    use std::sync::Arc;

    fn graph() -> Graph {
        Graph::new(Arc::new(MemoryEngine::new()))
    }

    #[test]
    fn test_csi_source() {
        let mut g = graph();
        let mut src = SourceBin::new_csi(&mut g, "camera", 1280, 720, 30, 1).unwrap();

        assert!(src.is_live());
        assert_eq!(g.ghost_pads(src.bin()), ["src"]);
        let filter = g.child_by_name(src.bin(), "camera-caps").unwrap();
        let caps = g.attribute(filter, "caps").unwrap();
        assert_eq!(
            caps.as_caps().unwrap().to_string(),
            "video/x-raw(memory:NVMM), width=(int)1280, height=(int)720, framerate=(fraction)30/1, format=(string)NV12"
        );

        src.set_sensor_id(&mut g, Some(2)).unwrap();
        assert_eq!(src.sensor_id(), Some(2));
        assert_eq!(g.attribute(src.source, "sensor-id"), Some(PropertyValue::UInt(2)));
    }

    #[test]
    fn test_csi_rejects_bad_mode() {
        let mut g = graph();
        assert!(matches!(
            SourceBin::new_csi(&mut g, "camera", 0, 720, 30, 1),
            Err(Error::InvalidValue(_))
        ));
    }

    #[test]
    fn test_uri_source() {
        let mut g = graph();
        let mut settings = UriSettings::new("file:///tmp/sample.mp4");
        settings.drop_frame_interval = 2;
        let src = SourceBin::new_uri(&mut g, "file", settings).unwrap();

        assert!(!src.is_live());
        assert_eq!(
            g.attribute(src.source, "drop-frame-interval"),
            Some(PropertyValue::UInt(2))
        );
        assert!(matches!(src.kind(), SourceKind::Uri(s) if s.uri.ends_with("sample.mp4")));

        let rtsp = SourceBin::new_uri(&mut g, "cam", UriSettings::new("rtsp://host/stream")).unwrap();
        assert!(rtsp.is_live());
    }

    #[test]
    fn test_is_my_parent() {
        let mut g = graph();
        let pipeline = g.new_pipeline_bin("pipeline").unwrap();
        let src = SourceBin::new_uri(&mut g, "src", UriSettings::new("rtsp://x")).unwrap();

        assert!(!src.is_my_parent(&g, pipeline));
        g.add_child(pipeline, src.bin()).unwrap();
        assert!(src.is_my_parent(&g, pipeline));
    }
}
