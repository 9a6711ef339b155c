//! Element factory catalog.
//!
//! Each factory declares its static pads and a closed list of recognized
//! properties. Setting a property outside that list is rejected instead of
//! being forwarded and silently ignored by the engine.

use crate::element::{PadTemplate, PropertySpec};
use crate::error::{Error, Result};
use std::collections::HashMap;

/// Pads and property schema of one factory.
#[derive(Debug, Clone)]
pub struct ElementSpec {
    /// Factory name.
    pub factory: String,
    /// Pad templates.
    pub pads: Vec<PadTemplate>,
    /// Recognized properties.
    pub properties: Vec<PropertySpec>,
}

impl ElementSpec {
    /// A spec with no pads and no properties.
    pub fn new(factory: impl Into<String>) -> Self {
        Self {
            factory: factory.into(),
            pads: Vec::new(),
            properties: Vec::new(),
        }
    }

    /// Add a pad template.
    pub fn with_pad(mut self, pad: PadTemplate) -> Self {
        self.pads.push(pad);
        self
    }

    /// Add "sink" and "src" always-pads.
    pub fn transform(self) -> Self {
        self.with_pad(PadTemplate::sink()).with_pad(PadTemplate::src())
    }

    /// Add recognized properties.
    pub fn with_properties(mut self, props: &[PropertySpec]) -> Self {
        self.properties.extend_from_slice(props);
        self
    }
}

// Properties every element accepts.
const COMMON: &[PropertySpec] = &[PropertySpec::text("name")];

/// Registry of known element factories.
#[derive(Debug, Clone)]
pub struct FactoryCatalog {
    specs: HashMap<String, ElementSpec>,
}

impl FactoryCatalog {
    /// An empty catalog.
    pub fn empty() -> Self {
        Self {
            specs: HashMap::new(),
        }
    }

    /// A catalog with the built-in factories registered.
    pub fn new() -> Self {
        let mut catalog = Self::empty();

        catalog.register(ElementSpec::new("queue").transform().with_properties(&[
            PropertySpec::uint("max-size-buffers"),
            PropertySpec::uint("max-size-bytes"),
            PropertySpec::uint("leaky"),
        ]));
        catalog.register(ElementSpec::new("identity").transform().with_properties(&[
            PropertySpec::uint("silent"),
        ]));
        catalog.register(ElementSpec::new("capsfilter").transform().with_properties(&[
            PropertySpec::caps("caps"),
        ]));
        catalog.register(ElementSpec::new("nvvideoconvert").transform().with_properties(&[
            PropertySpec::uint("gpu-id"),
            PropertySpec::uint("nvbuf-memory-type"),
            PropertySpec::text("src-crop"),
            PropertySpec::text("dest-crop"),
        ]));
        catalog.register(ElementSpec::new("nvdsosd").transform().with_properties(&[
            PropertySpec::uint("gpu-id"),
            PropertySpec::uint("process-mode"),
            PropertySpec::uint("display-clock"),
            PropertySpec::uint("display-text"),
            PropertySpec::text("clock-font"),
            PropertySpec::uint("clock-font-size"),
            PropertySpec::uint("x-clock-offset"),
            PropertySpec::uint("y-clock-offset"),
            PropertySpec::uint("clock-color"),
        ]));
        catalog.register(ElementSpec::new("nvinfer").transform().with_properties(&[
            PropertySpec::text("config-file-path"),
            PropertySpec::text("model-engine-file"),
            PropertySpec::uint("interval"),
            PropertySpec::uint("unique-id"),
            PropertySpec::uint("process-mode"),
            PropertySpec::uint("gpu-id"),
        ]));
        catalog.register(ElementSpec::new("nvtracker").transform().with_properties(&[
            PropertySpec::text("ll-lib-file"),
            PropertySpec::text("ll-config-file"),
            PropertySpec::uint("tracker-width"),
            PropertySpec::uint("tracker-height"),
            PropertySpec::uint("gpu-id"),
        ]));
        catalog.register(ElementSpec::new("nvmultistreamtiler").transform().with_properties(&[
            PropertySpec::uint("rows"),
            PropertySpec::uint("columns"),
            PropertySpec::uint("width"),
            PropertySpec::uint("height"),
            PropertySpec::uint("gpu-id"),
        ]));
        catalog.register(
            ElementSpec::new("nvarguscamerasrc")
                .with_pad(PadTemplate::src())
                .with_properties(&[
                    PropertySpec::uint("sensor-id"),
                    PropertySpec::uint("bufapi-version"),
                    PropertySpec::uint("maxperf"),
                ]),
        );
        catalog.register(
            ElementSpec::new("v4l2src")
                .with_pad(PadTemplate::src())
                .with_properties(&[PropertySpec::text("device")]),
        );
        catalog.register(
            ElementSpec::new("uridecodebin")
                .with_pad(PadTemplate::src())
                .with_properties(&[
                    PropertySpec::text("uri"),
                    PropertySpec::uint("cudadec-memtype"),
                    PropertySpec::uint("intra-decode"),
                    PropertySpec::uint("drop-frame-interval"),
                ]),
        );
        catalog.register(
            ElementSpec::new("fakesink")
                .with_pad(PadTemplate::sink())
                .with_properties(&[PropertySpec::uint("sync"), PropertySpec::uint("async")]),
        );
        catalog.register(
            ElementSpec::new("nveglglessink")
                .with_pad(PadTemplate::sink())
                .with_properties(&[
                    PropertySpec::uint("sync"),
                    PropertySpec::uint("window-x"),
                    PropertySpec::uint("window-y"),
                    PropertySpec::uint("window-width"),
                    PropertySpec::uint("window-height"),
                ]),
        );
        catalog.register(
            ElementSpec::new("filesink")
                .with_pad(PadTemplate::sink())
                .with_properties(&[PropertySpec::text("location"), PropertySpec::uint("sync")]),
        );
        catalog.register(ElementSpec::new("x264enc").transform().with_properties(&[
            PropertySpec::uint("bitrate"),
        ]));
        catalog.register(ElementSpec::new("qtmux").transform());

        catalog
    }

    /// Register a factory, replacing any previous spec with the same name.
    pub fn register(&mut self, mut spec: ElementSpec) {
        spec.properties.extend_from_slice(COMMON);
        self.specs.insert(spec.factory.clone(), spec);
    }

    /// Look up a factory.
    pub fn get(&self, factory: &str) -> Result<&ElementSpec> {
        self.specs
            .get(factory)
            .ok_or_else(|| Error::UnknownFactory(factory.to_string()))
    }

    /// Check if a factory is registered.
    pub fn is_registered(&self, factory: &str) -> bool {
        self.specs.contains_key(factory)
    }

    /// List all factory names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.specs.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for FactoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}
