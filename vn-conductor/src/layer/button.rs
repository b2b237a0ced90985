//! # Button 组件

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ButtonKind {
    Text { text: String },
    Image { file: String },
}

/// 按钮被点击后的去向
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ButtonTarget {
    /// true 为 call，false 为 jump
    pub call: bool,
    pub file: Option<String>,
    pub label: Option<String>,
    /// 点击时先执行的表达式
    pub exp: Option<String>,
}

impl ButtonTarget {
    /// 没有任何去向也没有表达式
    pub fn is_empty(&self) -> bool {
        self.file.is_none() && self.label.is_none() && self.exp.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Button {
    pub kind: ButtonKind,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub target: ButtonTarget,
    /// 系统按钮只受 `locksystembuttons` 影响
    pub system: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ButtonComponent {
    pub buttons: Vec<Button>,
    pub locked: bool,
    pub system_locked: bool,
}

impl ButtonComponent {
    pub fn add(&mut self, button: Button) {
        self.buttons.push(button);
    }

    pub fn clear(&mut self) {
        self.buttons.clear();
        self.locked = false;
        self.system_locked = false;
    }

    pub fn is_empty(&self) -> bool {
        self.buttons.is_empty()
    }

    /// 按下第 `index` 个按钮，返回其去向；已锁定或不存在时返回 None
    pub fn press(&self, index: usize) -> Option<&ButtonTarget> {
        let button = self.buttons.get(index)?;
        let locked = if button.system {
            self.system_locked
        } else {
            self.locked
        };
        (!locked).then_some(&button.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn button(system: bool, label: &str) -> Button {
        Button {
            kind: ButtonKind::Text {
                text: "OK".to_string(),
            },
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 30.0,
            target: ButtonTarget {
                label: Some(label.to_string()),
                ..ButtonTarget::default()
            },
            system,
        }
    }

    #[test]
    fn test_press_respects_locks() {
        let mut component = ButtonComponent::default();
        component.add(button(false, "a"));
        component.add(button(true, "menu"));

        component.locked = true;
        assert!(component.press(0).is_none());
        assert_eq!(
            component.press(1).and_then(|t| t.label.as_deref()),
            Some("menu")
        );

        component.system_locked = true;
        assert!(component.press(1).is_none());
        assert!(component.press(5).is_none());

        component.clear();
        assert!(component.is_empty());
        assert!(!component.locked);
    }
}
