//! End-to-end frame output checks driving a stage through whole ticks.

use limelight::color::Color;
use limelight::filter::{BlurFilter, GrayscaleFilter};
use limelight::geometry::Rect;
use limelight::renderer::PassTarget;
use limelight::texture::{TextureHandle, ATLAS_TEXTURE};
use limelight::tree::{NodeId, Stage};

fn new_stage(width: u32, height: u32) -> Stage {
    let _ = env_logger::builder().is_test(true).try_init();
    Stage::new(width, height)
}

fn rect_child(stage: &mut Stage, parent: NodeId, x: f32, y: f32, w: f32, h: f32) -> NodeId {
    let id = stage.create_node();
    stage.add_child(parent, id);
    stage.set_position(id, x, y);
    stage.set_dimensions(id, w, h);
    stage.set_rect(id, true);
    id
}

#[test]
fn incremental_update_matches_fresh_build() {
    let mut incremental = new_stage(800, 600);
    let root = incremental.root();
    let a = rect_child(&mut incremental, root, 10.0, 10.0, 50.0, 50.0);
    let b = rect_child(&mut incremental, a, 5.0, 5.0, 20.0, 20.0);
    incremental.frame();

    // Mutate only the middle of the chain across several frames.
    incremental.set_position(a, 30.0, 40.0);
    incremental.frame();
    incremental.set_scale(a, 2.0, 2.0);
    incremental.set_alpha(b, 0.5);
    incremental.frame();

    let mut fresh = new_stage(800, 600);
    let fresh_root = fresh.root();
    let fa = rect_child(&mut fresh, fresh_root, 30.0, 40.0, 50.0, 50.0);
    let fb = rect_child(&mut fresh, fa, 5.0, 5.0, 20.0, 20.0);
    fresh.set_scale(fa, 2.0, 2.0);
    fresh.set_alpha(fb, 0.5);
    fresh.frame();

    let got = incremental.world_context(b);
    let want = fresh.world_context(fb);
    assert!((got.px - want.px).abs() < 1e-5);
    assert!((got.py - want.py).abs() < 1e-5);
    assert!((got.ta - want.ta).abs() < 1e-5);
    assert!((got.td - want.td).abs() < 1e-5);
    assert!((got.alpha - want.alpha).abs() < 1e-5);
}

#[test]
fn z_index_reorders_siblings_behind_and_in_front() {
    let mut stage = new_stage(800, 600);
    let root = stage.root();
    let _a = rect_child(&mut stage, root, 0.0, 0.0, 50.0, 50.0);
    let b = rect_child(&mut stage, root, 100.0, 0.0, 50.0, 50.0);
    let _c = rect_child(&mut stage, root, 200.0, 0.0, 50.0, 50.0);
    stage.set_z_index(b, 5);

    let output = stage.frame();
    assert_eq!(output.stats.quads, 3);

    // Siblings at z 0 keep source order; the raised one paints last.
    let xs: Vec<f32> = (0..3)
        .map(|quad| output.vertices[quad * 4].position[0])
        .collect();
    assert_eq!(xs, vec![0.0, 200.0, 100.0]);
}

#[test]
fn same_state_siblings_batch_into_one_run() {
    let mut stage = new_stage(800, 600);
    let root = stage.root();
    for i in 0..4 {
        rect_child(&mut stage, root, i as f32 * 60.0, 0.0, 50.0, 50.0);
    }
    let output = stage.frame();
    assert_eq!(output.stats.quads, 4);
    assert_eq!(output.stats.runs, 1);
    assert_eq!(output.runs[0].texture, ATLAS_TEXTURE);
    assert_eq!(output.runs[0].quad_count, 4);
}

#[test]
fn alpha_premultiplies_into_vertex_colors() {
    let mut stage = new_stage(800, 600);
    let root = stage.root();
    let a = rect_child(&mut stage, root, 0.0, 0.0, 100.0, 100.0);
    stage.set_color(a, Color(0xFFFF0000));
    stage.set_alpha(a, 0.5);

    let output = stage.frame();
    assert_eq!(output.stats.quads, 1);
    // Premultiplied (128, 0, 0, 128) packed little-endian RGBA.
    for vertex in &output.vertices[0..4] {
        assert_eq!(vertex.color, 0x8000_0080);
    }
}

#[test]
fn clipping_parent_scissors_descendants() {
    let mut stage = new_stage(800, 600);
    let root = stage.root();
    let a = rect_child(&mut stage, root, 10.0, 20.0, 50.0, 40.0);
    stage.set_clipping(a, true);
    let _b = rect_child(&mut stage, a, 30.0, 30.0, 100.0, 100.0);

    let output = stage.frame();
    assert_eq!(output.stats.quads, 2);
    for run in &output.runs {
        assert_eq!(run.scissor, Some(Rect::new(10.0, 20.0, 50.0, 40.0)));
    }
}

#[test]
fn lazy_capture_skips_recapture_until_invalidated() {
    let mut stage = new_stage(800, 600);
    let root = stage.root();
    let a = rect_child(&mut stage, root, 10.0, 10.0, 100.0, 50.0);
    stage.set_render_to_texture(a, true, true);

    let first = stage.frame();
    let offscreen = first
        .passes
        .iter()
        .filter(|p| matches!(p.target, PassTarget::Texture(_)))
        .count();
    assert_eq!(offscreen, 1);
    let result = stage.result_texture(a).unwrap();

    // Nothing changed: the cached texture is composited directly.
    let second = stage.frame();
    assert_eq!(second.passes.len(), 1);
    assert_eq!(second.passes[0].target, PassTarget::Screen);
    assert_eq!(second.stats.quads, 1);
    assert_eq!(second.runs[0].texture, result);
    assert_eq!(stage.result_texture(a), Some(result));

    // Any dirtying setter invalidates the cache.
    stage.set_color(a, Color(0xFF00FF00));
    let third = stage.frame();
    let offscreen = third
        .passes
        .iter()
        .filter(|p| matches!(p.target, PassTarget::Texture(_)))
        .count();
    assert_eq!(offscreen, 1);
}

#[test]
fn filter_chain_adds_offscreen_passes_and_composites_result() {
    let mut stage = new_stage(800, 600);
    let root = stage.root();
    let a = rect_child(&mut stage, root, 0.0, 0.0, 64.0, 64.0);
    stage.set_render_to_texture(a, true, false);
    stage.add_filter(a, Box::new(BlurFilter::new(4.0)));

    let output = stage.frame();
    // Capture pass, filter pass, then the screen composite.
    let offscreen = output
        .passes
        .iter()
        .filter(|p| matches!(p.target, PassTarget::Texture(_)))
        .count();
    assert_eq!(offscreen, 2);
    let screen_pass = output.passes.last().unwrap();
    assert_eq!(screen_pass.target, PassTarget::Screen);

    let result = stage.result_texture(a).unwrap();
    let composite = &output.runs[screen_pass.runs.clone()][0];
    assert_eq!(composite.texture, result);
}

#[test]
fn every_filter_chain_pass_clears_its_target() {
    let mut stage = new_stage(800, 600);
    let root = stage.root();
    let a = rect_child(&mut stage, root, 0.0, 0.0, 64.0, 64.0);
    stage.set_render_to_texture(a, true, false);
    for _ in 0..3 {
        stage.add_filter(a, Box::new(GrayscaleFilter::new(0.5)));
    }

    let output = stage.frame();
    let result = stage.result_texture(a).unwrap();

    // An odd chain ping-pongs through the output target twice; each
    // filter pass fully overwrites its destination, so both must clear —
    // a loading second pass would blend onto the first intermediate.
    let result_clears: Vec<bool> = output
        .passes
        .iter()
        .filter(|p| p.target == PassTarget::Texture(result))
        .map(|p| p.clear)
        .collect();
    assert_eq!(result_clears, vec![true, true]);

    for pass in &output.passes {
        if matches!(pass.target, PassTarget::Texture(_)) {
            assert!(pass.clear);
        }
    }
}

#[test]
fn texture_dimensions_apply_to_unsized_nodes() {
    let mut stage = new_stage(800, 600);
    let tex = stage.create_texture();
    let a = stage.create_node();
    stage.add_child(stage.root(), a);
    stage.set_texture(a, Some(tex));

    // Still loading: nothing to draw yet.
    let output = stage.frame();
    assert_eq!(output.stats.quads, 0);

    stage.texture_loaded(tex, TextureHandle(42), 32, 16);
    let output = stage.frame();
    assert_eq!(output.stats.quads, 1);
    assert_eq!(output.vertices[2].position, [32.0, 16.0]);

    // An explicit size is never overridden by the texture's.
    let b = stage.create_node();
    stage.add_child(stage.root(), b);
    stage.set_position(b, 100.0, 0.0);
    stage.set_dimensions(b, 10.0, 10.0);
    stage.set_texture(b, Some(tex));
    let output = stage.frame();
    assert_eq!(output.stats.quads, 2);
    assert_eq!(output.vertices[6].position, [110.0, 10.0]);
}

#[test]
fn full_coverage_textured_capture_reuses_its_texture() {
    let mut stage = new_stage(800, 600);
    let tex = stage.create_texture();
    // Too large for the atlas: bound individually.
    stage.texture_loaded(tex, TextureHandle(42), 300, 300);
    let a = stage.create_node();
    stage.add_child(stage.root(), a);
    stage.set_texture(a, Some(tex));
    stage.set_render_to_texture(a, true, false);

    let output = stage.frame();
    // The capture is one full-coverage untinted quad of an individually
    // bound texture, so that texture stands in for it: no offscreen pass.
    assert_eq!(output.passes.len(), 1);
    assert_eq!(output.passes[0].target, PassTarget::Screen);
    assert_eq!(stage.result_texture(a), Some(TextureHandle(42)));
    assert_eq!(output.stats.quads, 1);
    assert_eq!(output.runs[0].texture, TextureHandle(42));
}

#[test]
fn zero_size_capture_node_renders_children_directly() {
    let mut stage = new_stage(800, 600);
    let holder = stage.create_node();
    stage.add_child(stage.root(), holder);
    stage.set_render_to_texture(holder, true, false);
    let _child = rect_child(&mut stage, holder, 5.0, 5.0, 20.0, 20.0);

    let output = stage.frame();
    assert!(output.passes.iter().all(|p| p.target == PassTarget::Screen));
    assert_eq!(output.stats.quads, 1);
    assert_eq!(output.vertices[0].position, [5.0, 5.0]);
}

#[test]
fn detached_subtree_disappears_from_output() {
    let mut stage = new_stage(800, 600);
    let root = stage.root();
    let a = rect_child(&mut stage, root, 0.0, 0.0, 50.0, 50.0);
    let output = stage.frame();
    assert_eq!(output.stats.quads, 1);

    stage.remove_child(a);
    let output = stage.frame();
    assert_eq!(output.stats.quads, 0);

    stage.add_child(stage.root(), a);
    let output = stage.frame();
    assert_eq!(output.stats.quads, 1);
}
