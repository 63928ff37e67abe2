/// Tests for CompiledGraph (compilation, provided resources, teardown)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use crate::error::{Error, Result};
use crate::graphics_device::mock_graphics_device::{MockDescriptorAllocator, MockEvent, MockGraphicsDevice, MockResource};
use crate::graphics_device::{
    CpuDescriptorHandle, Format, GpuResource, ResourceDesc, ResourceStates, ResourceView, ViewDesc,
};
use crate::render_graph::{CompiledGraph, FrameBuffering, GraphConfig, RenderGraph};

type Allocator = Arc<Mutex<MockDescriptorAllocator>>;

fn setup() -> (MockGraphicsDevice, Allocator) {
    let device = MockGraphicsDevice::new();
    let allocator = Arc::new(Mutex::new(MockDescriptorAllocator::new(device.journal.clone())));
    (device, allocator)
}

fn compile(graph: &RenderGraph, device: &mut MockGraphicsDevice, allocator: &Allocator) -> Result<CompiledGraph> {
    graph.compile(device, allocator.clone(), GraphConfig::default())
}

fn color_desc() -> ResourceDesc {
    ResourceDesc::texture_2d(16, 16, Format::R8G8B8A8_UNORM)
}

fn created(events: &[MockEvent]) -> Vec<(String, ResourceStates)> {
    events
        .iter()
        .filter_map(|event| match event {
            MockEvent::CreateResource { name, state } => Some((name.clone(), *state)),
            _ => None,
        })
        .collect()
}

fn descriptor_writes(events: &[MockEvent]) -> Vec<(CpuDescriptorHandle, String)> {
    events
        .iter()
        .filter_map(|event| match event {
            MockEvent::WriteDescriptor { handle, resource, .. } => Some((*handle, resource.clone())),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Compilation
// ============================================================================

#[test]
fn test_compile_creates_resources_per_buffering() {
    let mut graph = RenderGraph::new("buffering");
    let color = graph.create_resource("color", color_desc(), None, FrameBuffering::PerFrame);
    let history = graph.create_resource("history", color_desc(), None, FrameBuffering::Single);
    let _unused = graph.create_resource("unused", color_desc(), None, FrameBuffering::PerFrame);
    graph.add_pass("draw").render_target(color, ViewDesc::texture_2d()).build();
    graph.add_pass("resolve")
        .shader_resource(color, ViewDesc::texture_2d())
        .render_target(history, ViewDesc::texture_2d())
        .build();

    let (mut device, allocator) = setup();
    let compiled = compile(&graph, &mut device, &allocator).unwrap();

    // color ends every frame as a shader resource, its loop state
    assert_eq!(created(&device.events()), vec![
        ("color#0".to_string(), ResourceStates::ALL_SHADER_RESOURCE),
        ("color#1".to_string(), ResourceStates::ALL_SHADER_RESOURCE),
        ("history".to_string(), ResourceStates::RENDER_TARGET),
    ]);
    assert_eq!(compiled.resource(color, 0).map(|r| r.name()), Some("color#0"));
    assert_eq!(compiled.resource(color, 3).map(|r| r.name()), Some("color#1"));
    assert_eq!(compiled.resource(history, 1).map(|r| r.name()), Some("history"));
    assert_eq!(device.command_lists_created, 2);
}

#[test]
fn test_compile_reports_device_errors() {
    let mut graph = RenderGraph::new("oom");
    let color = graph.create_resource("color", color_desc(), None, FrameBuffering::Single);
    graph.add_pass("draw").render_target(color, ViewDesc::texture_2d()).build();

    let (mut device, allocator) = setup();
    device.fail_resource_creation = true;
    assert_eq!(compile(&graph, &mut device, &allocator).err(), Some(Error::OutOfMemory));
}

#[test]
fn test_compile_reports_plan_errors() {
    let mut graph = RenderGraph::new("invalid");
    let color = graph.create_resource("color", color_desc(), None, FrameBuffering::Single);
    graph.add_pass("draw")
        .render_target(color, ViewDesc::texture_2d().with_mips(4, 1))
        .build();

    let (mut device, allocator) = setup();
    let error = compile(&graph, &mut device, &allocator).err();
    assert!(matches!(error, Some(Error::DeclarationError { .. })));
    assert!(created(&device.events()).is_empty());
}

#[test]
fn test_compile_writes_descriptors_into_every_slot() {
    let mut graph = RenderGraph::new("descriptors");
    let a = graph.create_resource("a", color_desc(), None, FrameBuffering::PerFrame);
    let b = graph.create_resource("b", color_desc(), None, FrameBuffering::Single);
    let srv = ResourceView::ShaderResource(ViewDesc::texture_2d());
    let table = graph.create_descriptor_table(&[(a, srv), (b, srv)]);
    graph.add_pass("produce")
        .render_target(a, ViewDesc::texture_2d())
        .render_target(b, ViewDesc::texture_2d())
        .build();
    graph.add_pass("consume").descriptor_table(table).build();

    let (mut device, allocator) = setup();
    let _compiled = compile(&graph, &mut device, &allocator).unwrap();

    let writes = descriptor_writes(&device.events());
    // RTVs: 2 per slot, SR table: 2 per slot
    assert_eq!(writes.len(), 8);
    assert!(writes.contains(&(CpuDescriptorHandle(0x1000_0000), "a#0".to_string())));
    assert!(writes.contains(&(CpuDescriptorHandle(0x1000_0020), "b".to_string())));
    assert!(writes.contains(&(CpuDescriptorHandle(0x1000_0040), "a#1".to_string())));
    assert!(writes.contains(&(CpuDescriptorHandle(0x1000_0060), "b".to_string())));
    assert_eq!(allocator.lock().unwrap().allocated.len(), 4);
}

#[test]
fn test_drop_frees_every_range() {
    let mut graph = RenderGraph::new("teardown");
    let color = graph.create_resource("color", color_desc(), None, FrameBuffering::PerFrame);
    graph.add_pass("draw").render_target(color, ViewDesc::texture_2d()).build();
    graph.add_pass("sample").shader_resource(color, ViewDesc::texture_2d()).build();

    let (mut device, allocator) = setup();
    let mut compiled = compile(&graph, &mut device, &allocator).unwrap();
    compiled.execute(0).unwrap();
    drop(compiled);

    let allocator = allocator.lock().unwrap();
    assert_eq!(allocator.allocated.len(), 4);
    assert_eq!(allocator.freed, allocator.allocated);
}

// ============================================================================
// Frames
// ============================================================================

#[test]
fn test_fence_values_follow_submissions() {
    let mut graph = RenderGraph::new("fences");
    graph.add_pass("tick").build();
    let main = graph.main_section();

    let (mut device, allocator) = setup();
    let mut compiled = compile(&graph, &mut device, &allocator).unwrap();
    assert_eq!(compiled.last_signaled_value(main), 0);

    for frame in 0..5 {
        compiled.execute(frame).unwrap();
    }
    assert_eq!(compiled.last_signaled_value(main), 5);
    assert_eq!(compiled.section_fence(main).map(|fence| fence.completed_value()), Some(5));
    compiled.wait_frame(3).unwrap();
    compiled.wait_idle().unwrap();
}

#[test]
fn test_execute_rejects_external_dependencies() {
    let mut graph = RenderGraph::new("external");
    graph.add_pass("tick").build();
    let main = graph.main_section();
    graph.set_external_dependencies(main, 1);

    let (mut device, allocator) = setup();
    let mut compiled = compile(&graph, &mut device, &allocator).unwrap();
    assert!(matches!(compiled.execute(0), Err(Error::SchedulingError(_))));
}

#[test]
fn test_per_frame_resources_use_their_slot_in_barriers() {
    let mut graph = RenderGraph::new("slots");
    let color = graph.create_resource("color", color_desc(), Some(ResourceStates::COMMON), FrameBuffering::PerFrame);
    graph.add_pass("draw").render_target(color, ViewDesc::texture_2d()).build();

    let (mut device, allocator) = setup();
    let mut compiled = compile(&graph, &mut device, &allocator).unwrap();
    device.clear_events();
    compiled.execute(0).unwrap();
    compiled.execute(1).unwrap();

    let barriers: Vec<String> = device
        .events()
        .into_iter()
        .filter_map(|event| match event {
            MockEvent::Barrier { resource, .. } => Some(resource),
            _ => None,
        })
        .collect();
    // Pre COMMON -> RT and post RT -> COMMON, per frame
    assert_eq!(barriers, vec!["color#0", "color#0", "color#1", "color#1"]);
}

// ============================================================================
// Provided resources
// ============================================================================

fn swapchain(count: usize) -> Vec<Arc<dyn GpuResource>> {
    (0..count)
        .map(|index| Arc::new(MockResource::new(color_desc(), &format!("back_buffer{}", index))) as Arc<dyn GpuResource>)
        .collect()
}

#[test]
fn test_provided_handle_change_rewrites_descriptors() {
    let images = swapchain(3);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut graph = RenderGraph::new("present");
    let back_buffer = graph.import_provided_resource(
        "back_buffer",
        color_desc(),
        move |frame: u64| -> Result<Arc<dyn GpuResource>> {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(images[(frame % 3) as usize].clone())
        },
        Some(ResourceStates::PRESENT),
        Some(ResourceStates::PRESENT),
    );
    graph.add_pass("draw").render_target(back_buffer, ViewDesc::texture_2d()).build();

    let (mut device, allocator) = setup();
    let mut compiled = compile(&graph, &mut device, &allocator).unwrap();
    // Unknown until a frame begins
    assert!(descriptor_writes(&device.events()).is_empty());
    assert!(compiled.resource(back_buffer, 0).is_none());

    let mut written = Vec::new();
    for frame in 0..4 {
        device.clear_events();
        compiled.execute(frame).unwrap();
        written.push(descriptor_writes(&device.events()));
    }

    assert_eq!(calls.load(Ordering::Relaxed), 4);
    assert_eq!(written[0], vec![(CpuDescriptorHandle(0x2000_0000), "back_buffer0".to_string())]);
    assert_eq!(written[1], vec![(CpuDescriptorHandle(0x2000_0020), "back_buffer1".to_string())]);
    assert_eq!(written[2], vec![(CpuDescriptorHandle(0x2000_0000), "back_buffer2".to_string())]);
    assert_eq!(written[3], vec![(CpuDescriptorHandle(0x2000_0020), "back_buffer0".to_string())]);
    assert_eq!(compiled.resource(back_buffer, 3).map(|r| r.name()), Some("back_buffer0"));
}

#[test]
fn test_provided_same_handle_keeps_descriptors() {
    let images = swapchain(2);
    let mut graph = RenderGraph::new("stable");
    let back_buffer = graph.import_provided_resource(
        "back_buffer",
        color_desc(),
        move |frame: u64| -> Result<Arc<dyn GpuResource>> { Ok(images[(frame % 2) as usize].clone()) },
        None,
        None,
    );
    graph.add_pass("draw").render_target(back_buffer, ViewDesc::texture_2d()).build();

    let (mut device, allocator) = setup();
    let mut compiled = compile(&graph, &mut device, &allocator).unwrap();
    compiled.execute(0).unwrap();
    compiled.execute(1).unwrap();
    device.clear_events();
    compiled.execute(2).unwrap();
    compiled.execute(3).unwrap();

    assert!(descriptor_writes(&device.events()).is_empty());
}

#[test]
fn test_provided_descriptor_mismatch_fails_begin_frame() {
    let mut graph = RenderGraph::new("mismatch");
    let back_buffer = graph.import_provided_resource(
        "back_buffer",
        color_desc(),
        |_frame: u64| -> Result<Arc<dyn GpuResource>> {
            Ok(Arc::new(MockResource::new(ResourceDesc::texture_2d(8, 8, Format::R8G8B8A8_UNORM), "small")))
        },
        None,
        None,
    );
    graph.add_pass("draw").render_target(back_buffer, ViewDesc::texture_2d()).build();

    let (mut device, allocator) = setup();
    let mut compiled = compile(&graph, &mut device, &allocator).unwrap();
    let result = compiled.begin_frame(0).map(|_| ());
    assert!(matches!(result, Err(Error::InvalidResource(message)) if message.contains("small")));
}

#[test]
fn test_provider_error_fails_begin_frame() {
    let mut graph = RenderGraph::new("lost");
    let back_buffer = graph.import_provided_resource(
        "back_buffer",
        color_desc(),
        |_frame: u64| -> Result<Arc<dyn GpuResource>> { Err(Error::BackendError("swapchain lost".to_string())) },
        None,
        None,
    );
    graph.add_pass("draw").render_target(back_buffer, ViewDesc::texture_2d()).build();

    let (mut device, allocator) = setup();
    let mut compiled = compile(&graph, &mut device, &allocator).unwrap();
    assert_eq!(compiled.execute(0), Err(Error::BackendError("swapchain lost".to_string())));
}
