//! # Scene 模块
//!
//! 场景对象注册表。组件初始化时按名字解析自己引用的对象，
//! 找不到即返回 [`SceneError`]，不会静默忽略。

mod objects;

pub use objects::{Door, SceneObject, Task, TextLabel};

use std::collections::HashMap;
use std::rc::Rc;

use seq_runtime::{BusError, EventBus};
use thiserror::Error;
use tracing::{debug, info};

/// 场景错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    #[error("场景中不存在{kind} '{name}'")]
    MissingObject { kind: &'static str, name: String },

    #[error("场景中已存在{kind} '{name}'")]
    DuplicateObject { kind: &'static str, name: String },
}

/// 场景切换回调（外部场景加载器）
pub trait SceneHook {
    /// 切换到构建顺序中的下一个场景
    fn advance_scene(&mut self);
}

/// 场景注册表
#[derive(Default)]
pub struct Scene {
    objects: HashMap<String, Rc<SceneObject>>,
    doors: HashMap<String, Rc<Door>>,
    tasks: HashMap<String, Rc<Task>>,
    labels: HashMap<String, Rc<TextLabel>>,
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("objects", &self.objects.len())
            .field("doors", &self.doors.len())
            .field("tasks", &self.tasks.len())
            .field("labels", &self.labels.len())
            .finish()
    }
}

/// 任务完成频道名
pub fn task_channel_name(task: &str) -> String {
    format!("task-completed/{task}")
}

fn insert_unique<T>(
    map: &mut HashMap<String, Rc<T>>,
    kind: &'static str,
    name: &str,
    value: T,
) -> Result<Rc<T>, SceneError> {
    if map.contains_key(name) {
        return Err(SceneError::DuplicateObject {
            kind,
            name: name.to_string(),
        });
    }
    let value = Rc::new(value);
    map.insert(name.to_string(), value.clone());
    debug!(kind, name, "场景对象已注册");
    Ok(value)
}

fn resolve<T>(
    map: &HashMap<String, Rc<T>>,
    kind: &'static str,
    name: &str,
) -> Result<Rc<T>, SceneError> {
    map.get(name).cloned().ok_or_else(|| SceneError::MissingObject {
        kind,
        name: name.to_string(),
    })
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// 构建默认的飞船场景（与默认 `BindingConfig` 的名字一致）
    pub fn ship(bus: &EventBus) -> Result<Self, crate::HostError> {
        let mut scene = Self::new();

        scene.add_label("opening_text")?;
        scene.add_label("title_text")?;

        scene.add_object("crystal", false)?;
        scene.add_object("container_arrow", true)?;
        scene.add_object("monitor_arrow", false)?;
        scene.add_object("transition_collider", false)?;

        scene.add_door("engine_room_door")?;
        scene.add_door("cargo_door")?;
        scene.add_task(bus, "restart_generator")?;

        info!(scene = ?scene, "场景构建完成");
        Ok(scene)
    }

    // ========== 注册 ==========

    pub fn add_object(&mut self, name: &str, active: bool) -> Result<Rc<SceneObject>, SceneError> {
        insert_unique(
            &mut self.objects,
            "对象",
            name,
            SceneObject::new(name, active),
        )
    }

    pub fn add_door(&mut self, name: &str) -> Result<Rc<Door>, SceneError> {
        insert_unique(&mut self.doors, "门", name, Door::new(name))
    }

    pub fn add_label(&mut self, name: &str) -> Result<Rc<TextLabel>, SceneError> {
        insert_unique(&mut self.labels, "文字", name, TextLabel::new(name))
    }

    /// 注册任务，同时在总线上注册它的完成频道
    pub fn add_task(&mut self, bus: &EventBus, name: &str) -> Result<Rc<Task>, AddTaskError> {
        let channel = bus.channel(&task_channel_name(name))?;
        Ok(insert_unique(
            &mut self.tasks,
            "任务",
            name,
            Task::new(name, channel),
        )?)
    }

    // ========== 查找 ==========

    pub fn object(&self, name: &str) -> Result<Rc<SceneObject>, SceneError> {
        resolve(&self.objects, "对象", name)
    }

    pub fn door(&self, name: &str) -> Result<Rc<Door>, SceneError> {
        resolve(&self.doors, "门", name)
    }

    pub fn task(&self, name: &str) -> Result<Rc<Task>, SceneError> {
        resolve(&self.tasks, "任务", name)
    }

    pub fn label(&self, name: &str) -> Result<Rc<TextLabel>, SceneError> {
        resolve(&self.labels, "文字", name)
    }

    /// 已上锁的门数
    pub fn locked_door_count(&self) -> usize {
        self.doors.values().filter(|d| d.is_locked()).count()
    }
}

/// 注册任务时的错误
#[derive(Error, Debug)]
pub enum AddTaskError {
    #[error(transparent)]
    Scene(#[from] SceneError),

    #[error(transparent)]
    Bus(#[from] BusError),
}

impl From<AddTaskError> for crate::HostError {
    fn from(e: AddTaskError) -> Self {
        match e {
            AddTaskError::Scene(e) => e.into(),
            AddTaskError::Bus(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_name_is_error() {
        let scene = Scene::new();
        let err = scene.door("nowhere").unwrap_err();
        assert_eq!(
            err,
            SceneError::MissingObject {
                kind: "门",
                name: "nowhere".to_string()
            }
        );
        assert_eq!(err.to_string(), "场景中不存在门 'nowhere'");
    }

    #[test]
    fn test_duplicate_name_is_error() {
        let mut scene = Scene::new();
        scene.add_object("arrow", true).unwrap();
        assert!(matches!(
            scene.add_object("arrow", false),
            Err(SceneError::DuplicateObject { .. })
        ));
    }

    #[test]
    fn test_ship_scene_resolves_default_bindings() {
        let bus = EventBus::new();
        let scene = Scene::ship(&bus).unwrap();
        let bindings = crate::config::BindingConfig::default();

        assert!(scene.label(&bindings.opening_text).is_ok());
        assert!(scene.label(&bindings.title_text).is_ok());
        assert!(scene.object(&bindings.crystal).is_ok());
        assert!(scene.object(&bindings.transition_collider).is_ok());
        for door in &bindings.doors {
            assert!(scene.door(door).is_ok());
        }
        let task = scene.task(&bindings.engine_room_task).unwrap();
        assert_eq!(
            bus.lookup(&task_channel_name(&bindings.engine_room_task)),
            Some(task.channel())
        );
    }
}
