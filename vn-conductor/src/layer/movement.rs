//! # Movement 组件
//!
//! 图层沿路径移动。路径的第一个点是开始移动时图层的位置。
//!
//! 插值结果的坐标向下取整，因此相位 0 与相位 1 精确落在路径的起点与终点。

use serde::{Deserialize, Serialize};

/// 路径上的一个点
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovePoint {
    pub x: f64,
    pub y: f64,
    pub alpha: f64,
}

impl MovePoint {
    pub fn new(x: f64, y: f64, alpha: f64) -> Self {
        Self { x, y, alpha }
    }
}

/// 路径插值方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveKind {
    #[default]
    Linear,
    Bezier2,
    Bezier3,
    CatmullRom,
}

impl MoveKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "linear" => Some(Self::Linear),
            "bezier2" => Some(Self::Bezier2),
            "bezier3" => Some(Self::Bezier3),
            "catmullrom" => Some(Self::CatmullRom),
            _ => None,
        }
    }
}

/// 缓动方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EaseMode {
    #[default]
    None,
    In,
    Out,
    Both,
}

impl EaseMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "in" => Some(Self::In),
            "out" => Some(Self::Out),
            "both" | "inout" => Some(Self::Both),
            _ => None,
        }
    }

    /// 计算缓动值（二次曲线）
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            EaseMode::None => t,
            EaseMode::In => t * t,
            EaseMode::Out => 1.0 - (1.0 - t) * (1.0 - t),
            EaseMode::Both => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
        }
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a * (1.0 - t) + b * t
}

fn floor_point(x: f64, y: f64, alpha: f64) -> MovePoint {
    MovePoint::new(x.floor(), y.floor(), alpha)
}

fn linear(points: &[MovePoint], phase: f64) -> MovePoint {
    let segments = points.len() - 1;
    let pos = phase * segments as f64;
    let index = (pos.floor() as usize).min(segments - 1);
    let t = pos - index as f64;
    let (a, b) = (points[index], points[index + 1]);
    floor_point(lerp(a.x, b.x, t), lerp(a.y, b.y, t), lerp(a.alpha, b.alpha, t))
}

fn bezier2(p: &[MovePoint], t: f64) -> MovePoint {
    let u = 1.0 - t;
    let f = |a: f64, b: f64, c: f64| u * u * a + 2.0 * u * t * b + t * t * c;
    floor_point(
        f(p[0].x, p[1].x, p[2].x),
        f(p[0].y, p[1].y, p[2].y),
        f(p[0].alpha, p[1].alpha, p[2].alpha),
    )
}

fn bezier3(p: &[MovePoint], t: f64) -> MovePoint {
    let u = 1.0 - t;
    let f = |a: f64, b: f64, c: f64, d: f64| {
        u * u * u * a + 3.0 * u * u * t * b + 3.0 * u * t * t * c + t * t * t * d
    };
    floor_point(
        f(p[0].x, p[1].x, p[2].x, p[3].x),
        f(p[0].y, p[1].y, p[2].y, p[3].y),
        f(p[0].alpha, p[1].alpha, p[2].alpha, p[3].alpha),
    )
}

fn catmull_rom(points: &[MovePoint], phase: f64) -> MovePoint {
    let segments = points.len() - 1;
    let pos = phase * segments as f64;
    let index = (pos.floor() as usize).min(segments - 1);
    let t = pos - index as f64;

    let p1 = points[index];
    let p2 = points[index + 1];
    let p0 = if index == 0 { p1 } else { points[index - 1] };
    let p3 = points.get(index + 2).copied().unwrap_or(p2);

    let f = |a: f64, b: f64, c: f64, d: f64| {
        0.5 * (2.0 * b
            + (-a + c) * t
            + (2.0 * a - 5.0 * b + 4.0 * c - d) * t * t
            + (-a + 3.0 * b - 3.0 * c + d) * t * t * t)
    };
    floor_point(
        f(p0.x, p1.x, p2.x, p3.x),
        f(p0.y, p1.y, p2.y, p3.y),
        f(p0.alpha, p1.alpha, p2.alpha, p3.alpha).clamp(0.0, 1.0),
    )
}

/// 在路径上按相位插值
///
/// 点数不足时（bezier2 需要 3 个点，bezier3 需要 4 个点）退化为线性插值。
pub fn interpolate(points: &[MovePoint], kind: MoveKind, phase: f64) -> MovePoint {
    match points {
        [] => MovePoint::new(0.0, 0.0, 1.0),
        [only] => floor_point(only.x, only.y, only.alpha),
        [first, ..] if phase <= 0.0 => floor_point(first.x, first.y, first.alpha),
        [.., last] if phase >= 1.0 => floor_point(last.x, last.y, last.alpha),
        _ => match kind {
            MoveKind::Bezier2 if points.len() == 3 => bezier2(points, phase),
            MoveKind::Bezier3 if points.len() == 4 => bezier3(points, phase),
            MoveKind::CatmullRom => catmull_rom(points, phase),
            _ => linear(points, phase),
        },
    }
}

/// 移动组件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveComponent {
    pub points: Vec<MovePoint>,
    pub kind: MoveKind,
    pub ease: EaseMode,
    pub duration: u64,
    pub delay: u64,
    pub looping: bool,
    /// 已经过的时间（含 delay）
    pub elapsed: u64,
    #[serde(skip)]
    last_tick: Option<u64>,
}

impl MoveComponent {
    pub fn new(
        points: Vec<MovePoint>,
        kind: MoveKind,
        ease: EaseMode,
        duration: u64,
        delay: u64,
        looping: bool,
        tick: u64,
    ) -> Self {
        Self {
            points,
            kind,
            ease,
            duration,
            delay,
            looping,
            elapsed: 0,
            last_tick: Some(tick),
        }
    }

    /// 当前相位（0.0 - 1.0，已应用缓动）
    pub fn phase(&self) -> f64 {
        let effective = self.elapsed.saturating_sub(self.delay);
        let raw = if self.duration == 0 {
            1.0
        } else if self.looping {
            (effective % self.duration) as f64 / self.duration as f64
        } else {
            (effective as f64 / self.duration as f64).min(1.0)
        };
        self.ease.apply(raw)
    }

    pub fn is_finished(&self) -> bool {
        !self.looping && self.elapsed.saturating_sub(self.delay) >= self.duration
    }

    pub fn current(&self) -> MovePoint {
        interpolate(&self.points, self.kind, self.phase())
    }

    pub fn end_point(&self) -> MovePoint {
        interpolate(&self.points, self.kind, 1.0)
    }

    /// 推进时间
    pub fn update(&mut self, tick: u64) {
        if let Some(last) = self.last_tick {
            self.elapsed = self.elapsed.saturating_add(tick.saturating_sub(last));
        }
        self.last_tick = Some(tick);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path() -> Vec<MovePoint> {
        vec![
            MovePoint::new(10.0, 20.0, 1.0),
            MovePoint::new(110.0, 70.0, 0.5),
            MovePoint::new(300.0, 0.0, 0.0),
        ]
    }

    #[test]
    fn test_linear_endpoints_exact() {
        let points = path();
        assert_eq!(interpolate(&points, MoveKind::Linear, 0.0), points[0]);
        assert_eq!(interpolate(&points, MoveKind::Linear, 1.0), points[2]);
        // 中点落在第一段末尾
        assert_eq!(interpolate(&points, MoveKind::Linear, 0.5), points[1]);
    }

    #[test]
    fn test_linear_floor_rounding() {
        let points = vec![MovePoint::new(0.0, 0.0, 1.0), MovePoint::new(10.0, 10.0, 1.0)];
        let p = interpolate(&points, MoveKind::Linear, 0.33);
        assert_eq!((p.x, p.y), (3.0, 3.0));
    }

    #[test]
    fn test_curves_endpoints_exact() {
        let points = path();
        for kind in [MoveKind::Bezier2, MoveKind::CatmullRom] {
            assert_eq!(interpolate(&points, kind, 0.0), points[0]);
            assert_eq!(interpolate(&points, kind, 1.0), points[2]);
        }
    }

    #[test]
    fn test_easing() {
        for ease in [EaseMode::None, EaseMode::In, EaseMode::Out, EaseMode::Both] {
            assert_eq!(ease.apply(0.0), 0.0);
            assert_eq!(ease.apply(1.0), 1.0);
        }
        assert!(EaseMode::In.apply(0.5) < 0.5);
        assert!(EaseMode::Out.apply(0.5) > 0.5);
        assert_eq!(EaseMode::Both.apply(0.5), 0.5);
    }

    #[test]
    fn test_component_progress() {
        let mut movement = MoveComponent::new(
            vec![MovePoint::new(0.0, 0.0, 1.0), MovePoint::new(100.0, 0.0, 1.0)],
            MoveKind::Linear,
            EaseMode::None,
            100,
            20,
            false,
            1000,
        );
        movement.update(1020);
        assert_eq!(movement.current().x, 0.0);
        movement.update(1070);
        assert_eq!(movement.current().x, 50.0);
        assert!(!movement.is_finished());
        movement.update(1200);
        assert_eq!(movement.current().x, 100.0);
        assert!(movement.is_finished());
    }

    #[test]
    fn test_component_survives_serialization() {
        let mut movement = MoveComponent::new(
            path(),
            MoveKind::Linear,
            EaseMode::None,
            100,
            0,
            false,
            0,
        );
        movement.update(40);
        let json = serde_json::to_string(&movement).unwrap();
        let mut restored: MoveComponent = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.elapsed, 40);
        // 恢复后第一次 update 只建立基准
        restored.update(5000);
        assert_eq!(restored.elapsed, 40);
        restored.update(5010);
        assert_eq!(restored.elapsed, 50);
    }
}
