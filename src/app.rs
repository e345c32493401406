//! egui front end: fractal picker, generated controls and the live view.

use std::time::{Duration, Instant};

use eframe::{egui, App};
use egui::{pos2, Color32, ColorImage, Key, Rect, Sense, TextureHandle};
use tracing::{error, info, warn};

use crate::animation::{EngineState, NeverCancel};
use crate::capability::{Control, FractalAction};
use crate::config::AppConfig;
use crate::coords::WidgetSize;
use crate::export;
use crate::fractal::FractalInstance;
use crate::navigation::{
    CursorCommand, NavKey, NavResponse, NavigationController, NavigationMode, PointerButton,
};
use crate::params::{ParamId, ParamValue, ParameterStore, Point2, Rgba};
use crate::position_log;
use crate::registry::FractalRegistry;
use crate::render::Renderer;
use crate::state;

/// Ticks run per frame at most, so a stalled frame does not fast-forward.
const MAX_TICKS_PER_FRAME: u32 = 4;

const MOVEMENT_KEYS: [(Key, NavKey); 4] = [
    (Key::W, NavKey::Forward),
    (Key::S, NavKey::Back),
    (Key::A, NavKey::Left),
    (Key::D, NavKey::Right),
];

/// Work requested by widgets, applied once the panels are drawn.
#[derive(Debug, Clone, PartialEq)]
enum UiAction {
    Select(String),
    Fractal(FractalAction),
    ShowStart,
    ShowEnd,
    TogglePreview,
    Record,
}

pub struct StudioApp {
    config: AppConfig,
    registry: FractalRegistry,
    renderer: Box<dyn Renderer>,
    navigation: NavigationController,
    tex: Option<TextureHandle>,
    rendered_size: (u32, u32),
    view_size: (u32, u32),
    last_tick: Instant,
    pending: Duration,
    shift_down: bool,
    ctrl_down: bool,
    position_input: String,
    status: String,
}

impl StudioApp {
    pub fn new(config: AppConfig, registry: FractalRegistry, renderer: Box<dyn Renderer>) -> Self {
        let mode = registry
            .current()
            .map(FractalInstance::navigation_mode)
            .unwrap_or(NavigationMode::Plane);
        let navigation = NavigationController::new(mode).with_zoom_anchor(config.zoom_anchor);
        Self {
            config,
            registry,
            renderer,
            navigation,
            tex: None,
            rendered_size: (0, 0),
            view_size: (0, 0),
            last_tick: Instant::now(),
            pending: Duration::ZERO,
            shift_down: false,
            ctrl_down: false,
            position_input: String::new(),
            status: String::from("Ready"),
        }
    }

    fn report_ok(&mut self, message: impl Into<String>) {
        self.status = message.into();
        info!("{}", self.status);
    }

    fn report_err(&mut self, context: &str, err: impl std::fmt::Display) {
        self.status = format!("{context}: {err}");
        error!("{}", self.status);
    }

    fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.config.tick_interval_ms.max(1))
    }

    /// Runs the fixed ticks owed since the last frame.
    fn run_ticks(&mut self) {
        let interval = self.tick_interval();
        self.pending += self.last_tick.elapsed();
        self.last_tick = Instant::now();
        let mut ran = 0;
        while self.pending >= interval && ran < MAX_TICKS_PER_FRAME {
            self.pending -= interval;
            ran += 1;
            let Some(fractal) = self.registry.current_mut() else {
                return;
            };
            let moved = self.navigation.tick(fractal.params_mut());
            let previewed = fractal.preview_tick();
            if let Err(err) = moved.and(previewed) {
                self.report_err("tick", err);
                return;
            }
        }
        if ran == MAX_TICKS_PER_FRAME {
            self.pending = Duration::ZERO;
        }
    }

    fn apply_cursor(&self, ctx: &egui::Context, rect: Rect, response: NavResponse) {
        let Some(command) = response.cursor else {
            return;
        };
        let to_screen = |p: Point2| pos2(rect.min.x + p.x as f32, rect.min.y + p.y as f32);
        match command {
            CursorCommand::Grab { anchor } => {
                ctx.send_viewport_cmd(egui::ViewportCommand::CursorGrab(egui::CursorGrab::Confined));
                ctx.send_viewport_cmd(egui::ViewportCommand::CursorVisible(false));
                ctx.send_viewport_cmd(egui::ViewportCommand::CursorPosition(to_screen(anchor)));
            }
            CursorCommand::Warp(anchor) => {
                ctx.send_viewport_cmd(egui::ViewportCommand::CursorPosition(to_screen(anchor)));
            }
            CursorCommand::Release => {
                ctx.send_viewport_cmd(egui::ViewportCommand::CursorGrab(egui::CursorGrab::None));
                ctx.send_viewport_cmd(egui::ViewportCommand::CursorVisible(true));
            }
        }
    }

    fn handle_input(&mut self, ctx: &egui::Context, rect: Rect, hovered: bool) {
        let size = WidgetSize::new(rect.width() as f64, rect.height() as f64);
        let local = |p: egui::Pos2| Point2::new((p.x - rect.min.x) as f64, (p.y - rect.min.y) as f64);
        let (events, pointer, scroll, modifiers) = ctx.input(|i| {
            let mut presses = Vec::new();
            for (egui_button, button) in [
                (egui::PointerButton::Primary, PointerButton::Primary),
                (egui::PointerButton::Secondary, PointerButton::Secondary),
                (egui::PointerButton::Middle, PointerButton::Middle),
            ] {
                if i.pointer.button_pressed(egui_button) {
                    presses.push((button, true));
                }
                if i.pointer.button_released(egui_button) {
                    presses.push((button, false));
                }
            }
            let mut keys = Vec::new();
            for (key, nav) in MOVEMENT_KEYS {
                if i.key_pressed(key) {
                    keys.push((nav, true));
                }
                if i.key_released(key) {
                    keys.push((nav, false));
                }
            }
            if i.key_pressed(Key::Escape) {
                keys.push((NavKey::Escape, true));
            }
            let moved = if i.pointer.is_moving() {
                i.pointer.hover_pos()
            } else {
                None
            };
            (
                (presses, keys),
                (i.pointer.interact_pos(), moved),
                i.raw_scroll_delta.y,
                i.modifiers,
            )
        });
        let (presses, mut keys) = events;
        let (interact, moved) = pointer;

        // Shift and Ctrl act as held keys for vertical flight.
        if modifiers.shift != self.shift_down {
            self.shift_down = modifiers.shift;
            keys.push((NavKey::Up, modifiers.shift));
        }
        if modifiers.ctrl != self.ctrl_down {
            self.ctrl_down = modifiers.ctrl;
            keys.push((NavKey::Down, modifiers.ctrl));
        }

        let Some(fractal) = self.registry.current_mut() else {
            return;
        };
        let store = fractal.params_mut();
        let navigation = &mut self.navigation;
        let mut responses = Vec::new();
        let mut result = Ok(());

        for (button, pressed) in presses {
            if pressed {
                if let Some(pos) = interact.filter(|p| rect.contains(*p)) {
                    match navigation.pointer_pressed(store, button, local(pos), size) {
                        Ok(r) => responses.push(r),
                        Err(err) => result = Err(err),
                    }
                }
            } else {
                navigation.pointer_released(button);
            }
        }
        if let Some(pos) = moved {
            match navigation.pointer_moved(store, local(pos), size) {
                Ok(r) => responses.push(r),
                Err(err) => result = Err(err),
            }
        }
        if hovered && scroll != 0.0 {
            let delta = (scroll * self.config.wheel_units_per_point) as f64;
            let cursor = interact.map(local);
            if let Err(err) = navigation.wheel(store, delta, cursor, size) {
                result = Err(err);
            }
        }
        for (key, pressed) in keys {
            if pressed {
                responses.push(navigation.key_pressed(key));
            } else {
                navigation.key_released(key);
            }
        }

        for response in responses {
            self.apply_cursor(ctx, rect, response);
        }
        if let Err(err) = result {
            self.report_err("navigation", err);
        }
    }

    /// Renders into the preview texture when the store asked for a redraw.
    fn refresh_texture(&mut self, ctx: &egui::Context, size: (u32, u32)) {
        let scale = self.config.preview_scale.clamp(0.1, 1.0);
        let target = (
            ((size.0 as f32 * scale) as u32).max(1),
            ((size.1 as f32 * scale) as u32).max(1),
        );
        let Some(fractal) = self.registry.current_mut() else {
            return;
        };
        let redraw = fractal.params_mut().take_redraw();
        if !redraw && self.tex.is_some() && self.rendered_size == target {
            return;
        }
        let frame = fractal
            .uniforms(target)
            .map_err(|e| e.to_string())
            .and_then(|u| {
                self.renderer
                    .draw(fractal.kind(), &u, target)
                    .map_err(|e| e.to_string())
            });
        match frame {
            Ok(frame) => {
                let image = ColorImage::from_rgba_unmultiplied(
                    [target.0 as usize, target.1 as usize],
                    frame.as_raw(),
                );
                match &mut self.tex {
                    Some(tex) => tex.set(image, egui::TextureOptions::LINEAR),
                    None => {
                        self.tex =
                            Some(ctx.load_texture("preview", image, egui::TextureOptions::LINEAR))
                    }
                }
                self.rendered_size = target;
            }
            Err(err) => self.report_err("render", err),
        }
    }

    fn select(&mut self, name: &str) {
        if let Err(err) = self.registry.select(name) {
            self.report_err("select", err);
            return;
        }
        if let Some(fractal) = self.registry.current() {
            self.navigation = NavigationController::new(fractal.navigation_mode())
                .with_zoom_anchor(self.config.zoom_anchor);
            info!(fractal = name, mode = fractal.navigation_mode().label(), "fractal selected");
        }
    }

    fn apply(&mut self, ctx: &egui::Context, action: UiAction) {
        match action {
            UiAction::Select(name) => {
                let release = self.navigation.reset();
                self.apply_cursor(ctx, Rect::NOTHING, release);
                self.select(&name);
            }
            UiAction::Fractal(action) => self.fractal_action(action),
            UiAction::ShowStart | UiAction::ShowEnd => {
                let Some(fractal) = self.registry.current_mut() else {
                    return;
                };
                let result = if action == UiAction::ShowStart {
                    fractal.show_animation_start()
                } else {
                    fractal.show_animation_end()
                };
                if let Err(err) = result {
                    self.report_err("animation", err);
                }
            }
            UiAction::TogglePreview => {
                if let Some(engine) = self.registry.current_mut().and_then(|f| f.animation_mut()) {
                    let on = engine.state() != EngineState::Previewing;
                    engine.set_previewing(on);
                }
            }
            UiAction::Record => self.record(),
        }
    }

    fn record(&mut self) {
        let size = self.view_size;
        let dir = self.config.video_dir.clone();
        let mut encoder = self.config.video.encoder();
        let extension = self.config.video.codec.extension();
        let Some(fractal) = self.registry.current_mut() else {
            return;
        };
        match export::record_video(
            fractal,
            self.renderer.as_mut(),
            &mut encoder,
            size,
            &dir,
            extension,
            &NeverCancel,
        ) {
            Ok(path) => self.report_ok(format!("Video saved to {}", path.display())),
            Err(err) => self.report_err("record", err),
        }
    }

    fn fractal_action(&mut self, action: FractalAction) {
        match action {
            FractalAction::SaveState => self.save_state_dialog(),
            FractalAction::LoadState => self.load_state_dialog(),
            FractalAction::Screenshot => {
                let size = self.view_size;
                let dir = self.config.screenshot_dir.clone();
                let Some(fractal) = self.registry.current() else {
                    return;
                };
                match export::take_screenshot(fractal, self.renderer.as_mut(), size, &dir) {
                    Ok(path) => self.report_ok(format!("Screenshot saved to {}", path.display())),
                    Err(err) => self.report_err("screenshot", err),
                }
            }
            FractalAction::SavePosition => {
                let log = self.config.position_log.clone();
                let Some(fractal) = self.registry.current() else {
                    return;
                };
                match position_log::current_position(fractal)
                    .and_then(|p| position_log::append(&log, p))
                {
                    Ok(()) => self.report_ok(format!("Position appended to {}", log.display())),
                    Err(err) => self.report_err("save position", err),
                }
            }
            FractalAction::GoToPosition => {
                let input = self.position_input.clone();
                let Some(fractal) = self.registry.current_mut() else {
                    return;
                };
                let result = position_log::current_position(fractal)
                    .and_then(|current| position_log::parse_position_input(&input, current))
                    .and_then(|target| position_log::apply_position(fractal, target));
                match result {
                    Ok(()) => self.report_ok("Moved to position"),
                    Err(err) => self.report_err("go to position", err),
                }
            }
        }
    }

    fn save_state_dialog(&mut self) {
        let Some(fractal) = self.registry.current() else {
            return;
        };
        let Some(path) = rfd::FileDialog::new()
            .add_filter("State", &["json"])
            .set_directory(&self.config.state_dir)
            .set_file_name(format!("{}.json", fractal.name().replace(' ', "_")))
            .save_file()
        else {
            return;
        };
        match state::save_to_path(fractal, &path) {
            Ok(()) => self.report_ok(format!("State saved to {}", path.display())),
            Err(err) => self.report_err("save state", err),
        }
    }

    fn load_state_dialog(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("State", &["json"])
            .set_directory(&self.config.state_dir)
            .pick_file()
        else {
            return;
        };
        let Some(fractal) = self.registry.current_mut() else {
            return;
        };
        match state::load_from_path(fractal, &path) {
            Ok(()) => self.report_ok(format!("State loaded from {}", path.display())),
            Err(err) => self.report_err("load state", err),
        }
    }
}

impl App for StudioApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.run_ticks();
        let mut actions = Vec::new();

        egui::TopBottomPanel::top("top").show(ctx, |ui| {
            ui.horizontal_wrapped(|ui| {
                ui.heading("Fractal Studio");
                ui.separator();
                let current = self
                    .registry
                    .current()
                    .map(|f| f.name().to_string())
                    .unwrap_or_default();
                egui::ComboBox::from_label("Fractal")
                    .selected_text(current.as_str())
                    .show_ui(ui, |ui| {
                        for name in self.registry.names() {
                            if ui.selectable_label(name == current, name).clicked() && name != current {
                                actions.push(UiAction::Select(name.to_string()));
                            }
                        }
                    });
                ui.separator();
                ui.label(format!("Backend: {}", self.renderer.backend().label()));
                ui.label(format!("Navigation: {}", self.navigation.mode().label()));
            });
        });

        egui::SidePanel::left("left")
            .default_width(320.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    if let Some(fractal) = self.registry.current_mut() {
                        controls_ui(ui, fractal, &mut self.position_input, &mut actions);
                    }
                });
            });

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.label(&self.status);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            let avail = ui.available_size();
            let (rect, response) = ui.allocate_exact_size(avail, Sense::click_and_drag());
            self.view_size = (avail.x.max(1.0) as u32, avail.y.max(1.0) as u32);
            self.handle_input(ctx, rect, response.hovered());
            self.refresh_texture(ctx, self.view_size);
            if let Some(tex) = &self.tex {
                ui.painter().image(
                    tex.id(),
                    rect,
                    Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0)),
                    Color32::WHITE,
                );
            }
        });

        for action in actions {
            self.apply(ctx, action);
        }
        ctx.request_repaint_after(self.tick_interval());
    }
}

// ------------------------- Controls -------------------------

fn set_or_log(store: &mut ParameterStore, id: ParamId, value: impl Into<ParamValue>) {
    if let Err(err) = store.set(id, value) {
        error!("{id}: {err}");
    }
}

fn controls_ui(
    ui: &mut egui::Ui,
    fractal: &mut FractalInstance,
    position_input: &mut String,
    actions: &mut Vec<UiAction>,
) {
    ui.heading(fractal.name());
    ui.separator();
    let position_hint = match fractal.navigation_mode() {
        NavigationMode::Plane => "x; y; zoom",
        _ => "x; y; z",
    };
    for control in fractal.controls() {
        match control {
            Control::Slider {
                param,
                min,
                max,
                logarithmic,
            } => {
                let store = fractal.params_mut();
                let Ok(mut value) = store.float(param) else {
                    warn!("{param}: slider without a float parameter");
                    continue;
                };
                let slider = egui::Slider::new(&mut value, min..=max)
                    .text(param.label())
                    .logarithmic(logarithmic);
                if ui.add(slider).changed() {
                    set_or_log(store, param, value);
                }
            }
            Control::IntSlider { param, min, max } => {
                let store = fractal.params_mut();
                let Ok(mut value) = store.int(param) else {
                    continue;
                };
                if ui
                    .add(egui::Slider::new(&mut value, min..=max).text(param.label()))
                    .changed()
                {
                    set_or_log(store, param, value);
                }
            }
            Control::Checkbox { param } => {
                let store = fractal.params_mut();
                let Ok(mut value) = store.flag(param) else {
                    continue;
                };
                if ui.checkbox(&mut value, param.label()).changed() {
                    set_or_log(store, param, value);
                }
            }
            Control::ColorPicker { param } => {
                let store = fractal.params_mut();
                let Ok(color) = store.color(param) else {
                    continue;
                };
                let mut rgba = color.to_array();
                ui.horizontal(|ui| {
                    if ui.color_edit_button_rgba_unmultiplied(&mut rgba).changed() {
                        let [r, g, b, a] = rgba;
                        set_or_log(store, param, Rgba::new(r, g, b, a));
                    }
                    ui.label(param.label());
                });
            }
            Control::Action(action) => {
                if action == FractalAction::GoToPosition {
                    ui.horizontal(|ui| {
                        ui.add(
                            egui::TextEdit::singleline(position_input)
                                .hint_text(position_hint)
                                .desired_width(140.0),
                        );
                        if ui.button(action.label()).clicked() {
                            actions.push(UiAction::Fractal(action));
                        }
                    });
                } else if ui.button(action.label()).clicked() {
                    actions.push(UiAction::Fractal(action));
                }
            }
            Control::AnimationPanel => animation_ui(ui, fractal, actions),
        }
    }
}

fn animation_ui(ui: &mut egui::Ui, fractal: &mut FractalInstance, actions: &mut Vec<UiAction>) {
    let current: Vec<(ParamId, f64)> = fractal
        .params()
        .iter()
        .filter_map(|(id, v)| match v {
            ParamValue::Float(f) => Some((id, f)),
            _ => None,
        })
        .collect();
    let Some(engine) = fractal.animation_mut() else {
        return;
    };
    ui.separator();
    ui.collapsing("Animation", |ui| {
        let mut duration = engine.duration();
        if ui
            .add(egui::Slider::new(&mut duration, 1.0 / 60.0..=120.0).text("Duration (s)").logarithmic(true))
            .changed()
        {
            engine.set_duration(duration);
        }
        let mut speed = engine.preview_speed();
        if ui
            .add(egui::Slider::new(&mut speed, 0.1..=10.0).text("Preview speed").logarithmic(true))
            .changed()
        {
            engine.set_preview_speed(speed);
        }
        for spec in engine.specs_mut() {
            ui.horizontal(|ui| {
                ui.checkbox(&mut spec.enabled, spec.param.label());
                ui.add(egui::DragValue::new(&mut spec.start).speed(0.01).prefix("start "));
                ui.add(egui::DragValue::new(&mut spec.end).speed(0.01).prefix("end "));
                if let Some((_, value)) = current.iter().find(|(id, _)| *id == spec.param) {
                    if ui.small_button("⇤").on_hover_text("Start at current value").clicked() {
                        spec.start = *value;
                    }
                    if ui.small_button("⇥").on_hover_text("End at current value").clicked() {
                        spec.end = *value;
                    }
                }
            });
        }
        ui.horizontal(|ui| {
            if ui.button("Show start").clicked() {
                actions.push(UiAction::ShowStart);
            }
            if ui.button("Show end").clicked() {
                actions.push(UiAction::ShowEnd);
            }
            let previewing = engine.state() == EngineState::Previewing;
            if ui.button(if previewing { "Stop" } else { "Preview" }).clicked() {
                actions.push(UiAction::TogglePreview);
            }
            if ui.button("Record").clicked() {
                actions.push(UiAction::Record);
            }
        });
        ui.label(format!("{} frames at 60 fps", engine.frame_count()));
    });
}
