//! 故障效果
//!
//! 启用期间订阅 `glitch-intensity`，每个渲染 tick 消费一次强度，
//! 把扫描线抖动参数写入渲染端后归零。

use std::cell::RefCell;
use std::rc::Rc;

use seq_runtime::{
    BusError, ChannelId, EventBus, HandlerFault, IntensitySignal, JitterSink, ScanLineJitter,
    Subscription,
};
use tracing::{debug, trace};

use super::GLITCH_INTENSITY_CHANNEL;

pub struct GlitchyEffect {
    bus: Rc<EventBus>,
    channel: ChannelId,
    signal: Rc<RefCell<IntensitySignal>>,
    subscription: Option<Subscription>,
    /// 强制满强度
    pub full_glitch: bool,
}

impl std::fmt::Debug for GlitchyEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlitchyEffect")
            .field("enabled", &self.is_enabled())
            .field("intensity", &self.signal.borrow().value())
            .field("full_glitch", &self.full_glitch)
            .finish()
    }
}

impl GlitchyEffect {
    pub fn new(bus: &Rc<EventBus>, full_glitch: bool) -> Result<Self, BusError> {
        Ok(Self {
            bus: bus.clone(),
            channel: bus.channel(GLITCH_INTENSITY_CHANNEL)?,
            signal: Rc::new(RefCell::new(IntensitySignal::new())),
            subscription: None,
            full_glitch,
        })
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn is_enabled(&self) -> bool {
        self.subscription.is_some()
    }

    /// 启用：开始接收强度采样（重复启用无效果）
    pub fn enable(&mut self) -> Result<(), BusError> {
        if self.subscription.is_some() {
            return Ok(());
        }
        let signal = self.signal.clone();
        let subscription = self.bus.subscription(self.channel, move |payload| {
            let value = payload
                .as_scalar()
                .ok_or_else(|| HandlerFault::new("故障强度需要数值负载"))?;
            signal
                .try_borrow_mut()
                .map_err(|_| HandlerFault::new("强度信号正被占用"))?
                .set(value);
            Ok(())
        })?;
        self.subscription = Some(subscription);
        debug!("故障效果已启用");
        Ok(())
    }

    /// 停用：释放订阅
    pub fn disable(&mut self) {
        if self.subscription.take().is_some() {
            debug!("故障效果已停用");
        }
    }

    /// 渲染 tick：计算抖动参数、写入渲染端、强度归零
    pub fn render(&mut self, sink: &mut dyn JitterSink) -> ScanLineJitter {
        let intensity = {
            let mut signal = self.signal.borrow_mut();
            if self.full_glitch {
                signal.set(1.0);
            }
            signal.take()
        };
        let jitter = ScanLineJitter::from_intensity(intensity);
        sink.write(jitter.displacement, jitter.threshold);
        trace!(
            intensity,
            displacement = jitter.displacement,
            threshold = jitter.threshold,
            "扫描线抖动"
        );
        jitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seq_runtime::Payload;

    #[derive(Default)]
    struct Recorder(Vec<(f32, f32)>);

    impl JitterSink for Recorder {
        fn write(&mut self, displacement: f32, threshold: f32) {
            self.0.push((displacement, threshold));
        }
    }

    #[test]
    fn test_render_consumes_intensity() {
        let bus = Rc::new(EventBus::new());
        let mut glitch = GlitchyEffect::new(&bus, false).unwrap();
        glitch.enable().unwrap();
        let mut sink = Recorder::default();

        bus.publish(glitch.channel(), Payload::Scalar(1.0)).unwrap();
        glitch.render(&mut sink);
        glitch.render(&mut sink);

        assert_eq!(sink.0, vec![(0.05, 0.0), (0.0, 1.0)]);
    }

    #[test]
    fn test_disabled_effect_ignores_samples() {
        let bus = Rc::new(EventBus::new());
        let mut glitch = GlitchyEffect::new(&bus, false).unwrap();
        glitch.enable().unwrap();
        glitch.disable();
        assert_eq!(bus.handler_count(glitch.channel()), 0);

        bus.publish(glitch.channel(), Payload::Scalar(0.8)).unwrap();
        let jitter = glitch.render(&mut Recorder::default());
        assert_eq!(jitter, ScanLineJitter::from_intensity(0.0));
    }

    #[test]
    fn test_full_glitch_forces_max() {
        let bus = Rc::new(EventBus::new());
        let mut glitch = GlitchyEffect::new(&bus, true).unwrap();
        let jitter = glitch.render(&mut Recorder::default());
        assert_eq!((jitter.displacement, jitter.threshold), (0.05, 0.0));
    }

    #[test]
    fn test_non_scalar_sample_is_fault() {
        let bus = Rc::new(EventBus::new());
        let mut glitch = GlitchyEffect::new(&bus, false).unwrap();
        glitch.enable().unwrap();

        bus.publish(glitch.channel(), Payload::Text("max".into()))
            .unwrap();
        assert_eq!(bus.fault_count(), 1);
    }
}
