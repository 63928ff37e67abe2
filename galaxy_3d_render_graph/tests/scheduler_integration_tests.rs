//! Integration tests for frame scheduling: worker threads, external
//! dependencies released by other threads and frames in flight.
//!
//! Run with: cargo test --test scheduler_integration_tests


use device_test_utils::{lines_with, TestDescriptors, TestDevice, TestFence};
use galaxy_3d_render_graph::galaxy3d::device::{
    CommandListType, Fence, Format, ResourceDesc, ResourceStates, ViewDesc,
};
use galaxy_3d_render_graph::galaxy3d::render::{
    FrameBuffering, GraphConfig, RenderGraph, SectionId, SectionState, WaitValue,
};
use galaxy_3d_render_graph::galaxy3d::Error;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

// ============================================================================
// WIDE GRAPHS
// ============================================================================

/// `count` independent sections, each with two passes recording their name
fn wide_graph(count: usize, seen: Arc<Mutex<BTreeSet<String>>>) -> (RenderGraph, Vec<SectionId>) {
    let mut graph = RenderGraph::new("wide");
    let mut sections = vec![graph.main_section()];
    for index in 1..count {
        sections.push(graph.add_section(&format!("shadow{}", index), CommandListType::Direct));
    }
    for (index, section) in sections.iter().enumerate() {
        for pass in 0..2 {
            let seen = seen.clone();
            graph.add_pass(&format!("cascade{}_{}", index, pass))
                .section(*section)
                .execute_fn(move |ctx| {
                    let name = ctx.pass_name().to_string();
                    seen.lock().unwrap().insert(name);
                    Ok(())
                })
                .build();
        }
    }
    (graph, sections)
}

#[test]
fn test_integration_every_section_runs_each_frame() {
    let seen = Arc::new(Mutex::new(BTreeSet::new()));
    let (graph, sections) = wide_graph(6, seen.clone());
    let mut device = TestDevice::new();
    let descriptors = TestDescriptors::new(&device);
    let config = GraphConfig { frames_in_flight: 3, thread_count: 4, ..GraphConfig::default() };
    let mut compiled = graph.compile(&mut device, descriptors, config).unwrap();
    device.drain();

    for frame in 0..10 {
        compiled.execute(frame).unwrap();
        let trace = device.drain();
        assert_eq!(lines_with(&trace, "execute ").len(), 6, "frame {}", frame);
        assert_eq!(lines_with(&trace, "signal ").len(), 6, "frame {}", frame);
    }

    assert_eq!(seen.lock().unwrap().len(), 12);
    for section in sections {
        assert_eq!(compiled.last_signaled_value(section), 10);
        let fence = compiled.section_fence(section).unwrap();
        assert_eq!(fence.completed_value(), 10);
    }
    compiled.wait_idle().unwrap();
}

// ============================================================================
// EXTERNAL DEPENDENCIES
// ============================================================================

#[test]
fn test_integration_streaming_thread_releases_section() {
    let mut graph = RenderGraph::new("streaming");
    let upload = graph.add_section("upload", CommandListType::Copy);
    let main = graph.main_section();
    graph.set_external_dependencies(upload, 1);
    let staging = graph.create_resource("staging", ResourceDesc::buffer(4096), None, FrameBuffering::PerFrame);
    let mesh = graph.create_resource("mesh", ResourceDesc::buffer(4096), None, FrameBuffering::PerFrame);
    let copy_fence = TestFence::new("streamer");
    graph.add_section_wait(upload, copy_fence.clone(), WaitValue::FrameIndex);

    graph.add_pass("copy")
        .section(upload)
        .state(staging, ResourceStates::COPY_SOURCE)
        .state(mesh, ResourceStates::COPY_DEST)
        .build();
    graph.add_pass("draw")
        .shader_resource(mesh, ViewDesc::buffer(0, 1024, 0))
        .build();

    let mut device = TestDevice::new();
    let descriptors = TestDescriptors::new(&device);
    let config = GraphConfig { thread_count: 2, ..GraphConfig::default() };
    let mut compiled = graph.compile(&mut device, descriptors, config).unwrap();
    assert!(matches!(compiled.execute(0), Err(Error::SchedulingError(_))));
    device.drain();

    for frame in 1..4 {
        let scheduler = compiled.begin_frame(frame).unwrap();
        assert_eq!(scheduler.section_state(upload), Some(SectionState::WaitingOnDependencies));
        assert_eq!(scheduler.section_state(main), Some(SectionState::WaitingOnDependencies));

        std::thread::scope(|scope| {
            scope.spawn(|| {
                copy_fence.signal(frame).unwrap();
                scheduler.release(upload).unwrap();
            });
        });
        scheduler.run().unwrap();
        assert_eq!(scheduler.section_state(main), Some(SectionState::Idle));
        drop(scheduler);

        let trace = device.drain();
        let position = |line: &str| trace.iter().position(|recorded| recorded == line).unwrap();
        let external_wait = position(&format!("wait Copy streamer {}", frame));
        let copy = position(&format!("execute Copy streaming::upload#{}", frame % 2));
        let draw_wait = position(&format!("wait Direct streaming::upload {}", frame));
        let draw = position(&format!("execute Direct streaming::main#{}", frame % 2));
        assert!(external_wait < copy);
        assert!(copy < draw_wait && draw_wait < draw);
    }
}

#[test]
fn test_integration_unreleased_frame_submits_nothing() {
    let mut graph = RenderGraph::new("gated");
    let main = graph.main_section();
    graph.set_external_dependencies(main, 2);
    graph.add_pass("draw").build();

    let mut device = TestDevice::new();
    let descriptors = TestDescriptors::new(&device);
    let mut compiled = graph.compile(&mut device, descriptors, GraphConfig::default()).unwrap();
    device.drain();

    {
        let scheduler = compiled.begin_frame(0).unwrap();
        scheduler.release(main).unwrap();
        assert!(scheduler.run().is_err());
    }
    assert!(lines_with(&device.drain(), "execute ").is_empty());
    assert_eq!(compiled.last_signaled_value(main), 0);

    // The next frame starts clean
    let scheduler = compiled.begin_frame(1).unwrap();
    scheduler.release(main).unwrap();
    scheduler.release(main).unwrap();
    scheduler.run().unwrap();
    drop(scheduler);
    assert_eq!(compiled.last_signaled_value(main), 2);
}

#[test]
fn test_integration_single_buffered_history_alternates_queues() {
    let mut graph = RenderGraph::new("taa");
    let compute = graph.add_section("resolve", CommandListType::Compute);
    let history = graph.create_resource(
        "history",
        ResourceDesc::texture_2d(640, 360, Format::R16G16B16A16_FLOAT),
        None,
        FrameBuffering::Single,
    );
    graph.add_pass("accumulate")
        .section(compute)
        .unordered_access(history, ViewDesc::texture_2d())
        .build();
    graph.add_pass("present")
        .shader_resource(history, ViewDesc::texture_2d())
        .build();

    let mut device = TestDevice::new();
    let descriptors = TestDescriptors::new(&device);
    let mut compiled = graph.compile(&mut device, descriptors, GraphConfig::default()).unwrap();
    device.drain();

    for frame in 0..3u64 {
        compiled.execute(frame).unwrap();
        let trace = device.drain();
        let carried = format!("wait Compute taa::main {}", frame);
        // The previous frame's reader must finish before history is rewritten
        assert_eq!(trace.contains(&carried), frame > 0, "frame {}", frame);
    }
}
