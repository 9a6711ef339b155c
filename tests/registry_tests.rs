//! Integration tests for the named registry.

use bingraph::bins::UriSettings;
use bingraph::element::PropertyValue;
use bingraph::engine::MemoryEngine;
use bingraph::error::Error;
use bingraph::pipeline::{ControllerConfig, PipelineState, StateChangeListener};
use bingraph::registry::{Component, Registry};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn registry() -> (Arc<MemoryEngine>, Registry) {
    let engine = Arc::new(MemoryEngine::new());
    let registry = Registry::with_config(engine.clone(), ControllerConfig::testing());
    (engine, registry)
}

fn build_analytics(reg: &mut Registry) {
    reg.source_csi_new("camera", 1920, 1080, 30, 1).unwrap();
    reg.primary_gie_new("detector", "/opt/models/detector.txt", "/opt/models/detector.engine", 0, 1)
        .unwrap();
    reg.osd_new("osd", true).unwrap();
    reg.element_new("sink", "fakesink").unwrap();

    reg.pipeline_new("main").unwrap();
    for name in ["camera", "detector", "osd", "sink"] {
        reg.pipeline_component_add("main", name).unwrap();
    }
}

#[test]
fn test_full_pipeline_lifecycle() {
    let (engine, mut reg) = registry();
    build_analytics(&mut reg);

    assert!(reg.pipeline_link_all("main").unwrap());
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let listener: StateChangeListener = Arc::new(move |_: PipelineState, _: PipelineState| {
        calls_clone.fetch_add(1, Ordering::SeqCst);
    });
    reg.pipeline_state_change_listener_add("main", listener.clone())
        .unwrap();

    assert!(reg.pipeline_play("main").unwrap());
    reg.pipeline_dispatch_pending("main").unwrap();
    assert_eq!(reg.pipeline_state("main").unwrap(), PipelineState::Playing);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    assert!(reg.pipeline_pause("main").unwrap());
    reg.pipeline_dispatch_pending("main").unwrap();
    assert_eq!(reg.pipeline_state("main").unwrap(), PipelineState::Paused);

    assert!(reg.pipeline_stop("main").unwrap());
    assert_eq!(reg.pipeline_state("main").unwrap(), PipelineState::Null);

    reg.pipeline_state_change_listener_remove("main", &listener)
        .unwrap();
    reg.pipeline_unlink_all("main").unwrap();
    reg.pipeline_delete_all();
    reg.component_delete_all().unwrap();
    assert_eq!(reg.component_list_size(), 0);
    assert_eq!(reg.pipeline_list_size(), 0);
    assert_eq!(engine.object_count(), 0);
}

#[test]
fn test_camera_gets_sensor_id() {
    let (_, mut reg) = registry();
    build_analytics(&mut reg);

    let Component::Source(camera) = reg.component("camera").unwrap() else {
        panic!("camera is not a source");
    };
    assert_eq!(camera.sensor_id(), Some(0));
    let node = camera.bin();
    let g = reg.graph().lock().unwrap();
    let src = g.child_by_name(node, "camera-src").unwrap();
    assert_eq!(g.attribute(src, "sensor-id"), Some(PropertyValue::UInt(0)));
}

#[test]
fn test_sensor_ids_are_per_pipeline() {
    let (_, mut reg) = registry();
    reg.pipeline_new("a").unwrap();
    reg.pipeline_new("b").unwrap();
    reg.source_uri_new("s1", UriSettings::new("rtsp://cam/1")).unwrap();
    reg.source_uri_new("s2", UriSettings::new("rtsp://cam/2")).unwrap();
    reg.pipeline_component_add("a", "s1").unwrap();
    reg.pipeline_component_add("b", "s2").unwrap();

    for name in ["s1", "s2"] {
        let Component::Source(source) = reg.component(name).unwrap() else {
            panic!("{name} is not a source");
        };
        assert_eq!(source.sensor_id(), Some(0));
    }
}

#[test]
fn test_lookup_errors() {
    let (_, mut reg) = registry();
    assert_eq!(
        reg.pipeline_play("missing").unwrap_err(),
        Error::PipelineNotFound("missing".to_string())
    );
    reg.pipeline_new("main").unwrap();
    assert_eq!(
        reg.pipeline_new("main").unwrap_err(),
        Error::PipelineNameNotUnique("main".to_string())
    );
    assert_eq!(
        reg.pipeline_component_add("main", "ghost").unwrap_err(),
        Error::ComponentNotFound("ghost".to_string())
    );
    assert_eq!(
        reg.element_new("bad", "no-such-factory").unwrap_err(),
        Error::ConstructionFailure {
            factory: "no-such-factory".to_string(),
            name: "bad".to_string(),
            reason: Error::UnknownFactory("no-such-factory".to_string()).to_string(),
        }
    );
    assert_eq!(reg.component_list_size(), 0);
}

#[test]
fn test_component_in_one_pipeline_only() {
    let (_, mut reg) = registry();
    reg.pipeline_new("a").unwrap();
    reg.pipeline_new("b").unwrap();
    reg.reporter_new("reporter").unwrap();
    reg.pipeline_component_add("a", "reporter").unwrap();

    assert_eq!(
        reg.pipeline_component_add("b", "reporter").unwrap_err(),
        Error::ComponentInUse("reporter".to_string())
    );
    assert!(matches!(
        reg.pipeline_component_remove("b", "reporter"),
        Err(Error::NotAChild { .. })
    ));
    assert_eq!(reg.component_pipeline("reporter"), Some("a"));
}

#[test]
fn test_set_attribute_checks_schema() {
    let (_, mut reg) = registry();
    reg.element_new("queue", "queue").unwrap();

    reg.set_attribute("queue", "max-size-buffers", 8u32).unwrap();
    assert!(matches!(
        reg.set_attribute("queue", "bogus", 1u32),
        Err(Error::UnknownProperty { .. })
    ));
    assert!(matches!(
        reg.set_attribute("queue", "max-size-buffers", "eight"),
        Err(Error::PropertyKind { .. })
    ));
}

#[test]
fn test_component_mut_updates_osd() {
    let (_, mut reg) = registry();
    reg.osd_new("osd", false).unwrap();

    let (component, mut graph) = reg.component_mut("osd").unwrap();
    let Component::Osd(osd) = component else {
        panic!("osd is not an osd");
    };
    osd.set_clock_enabled(&mut graph, true).unwrap();
    assert!(osd.clock().enabled);
}

#[test]
fn test_lists_are_sorted() {
    let (_, mut reg) = registry();
    for name in ["zeta", "alpha", "mid"] {
        reg.bin_new(name).unwrap();
        reg.pipeline_new(name).unwrap();
    }
    assert_eq!(reg.component_list_all(), ["alpha", "mid", "zeta"]);
    assert_eq!(reg.pipeline_list_all(), ["alpha", "mid", "zeta"]);
}
