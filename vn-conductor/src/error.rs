//! # Error 模块
//!
//! 定义 vn-conductor 中使用的错误类型。
//!
//! 引擎采用 fail-fast 策略：除 `ignore_unknown_tags` 配置外，
//! 所有错误都会经由 `Engine::tick` 统一上抛并停止 Conductor。

use thiserror::Error;

/// 脚本解析错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// 无效的行格式
    #[error("第 {line} 行：无效的格式 - {message}")]
    InvalidLine { line: usize, message: String },

    /// 无效的参数字面量
    #[error("第 {line} 行：参数 '{param}' 的值无效 - {message}")]
    InvalidParameter {
        line: usize,
        param: String,
        message: String,
    },

    /// 表达式块未闭合
    #[error("第 {line} 行：表达式块 '---' 未闭合")]
    UnterminatedBlock { line: usize },

    /// 重复的标签
    #[error("第 {line} 行：标签 '{label}' 重复定义")]
    DuplicateLabel { line: usize, label: String },

    /// 重复的存档点
    #[error("第 {line} 行：存档点 '{mark}' 重复定义")]
    DuplicateSaveMark { line: usize, mark: String },
}

/// 表达式错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    /// 语法错误
    #[error("表达式语法错误: {message} (位于 '{source_text}')")]
    Syntax {
        source_text: String,
        message: String,
    },

    /// 未知的变量作用域
    #[error("未知的变量作用域 '{scope}'")]
    UnknownScope { scope: String },

    /// 只读作用域
    #[error("作用域 '{scope}' 是只读的")]
    ReadOnly { scope: String },

    /// 类型不匹配
    #[error("类型不匹配: {message}")]
    TypeMismatch { message: String },

    /// 除零
    #[error("除数为零")]
    DivisionByZero,

    /// 赋值目标无效
    #[error("无效的赋值目标: {message}")]
    InvalidTarget { message: String },
}

/// 指令（Tag）相关错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TagError {
    /// 未知指令
    #[error("未知指令 '{name}'")]
    UnknownTag { name: String },

    /// 缺少必需参数
    #[error("指令 '{tag}' 缺少必需参数 '{param}'")]
    MissingParameter { tag: String, param: String },

    /// 类型转换失败
    #[error("指令 '{tag}' 的参数 '{param}' 无法转换为 {expected}: {raw}")]
    CastFailed {
        tag: String,
        param: String,
        expected: String,
        raw: String,
    },

    /// 参数值不合法（已通过类型转换，但语义不合法）
    #[error("指令 '{tag}' 的参数 '{param}' 不合法: {message}")]
    InvalidParameter {
        tag: String,
        param: String,
        message: String,
    },

    /// 注册表中出现重复别名
    #[error("指令别名 '{alias}' 被重复注册")]
    DuplicateAlias { alias: String },

    /// 宏定义错误
    #[error("宏 '{name}' 定义错误: {reason}")]
    MalformedMacro { name: String, reason: MacroDefectKind },

    /// 宏重复定义
    #[error("宏 '{name}' 重复定义")]
    DuplicateMacro { name: String },

    /// 标签未找到
    #[error("标签 '{label}' 未找到")]
    LabelNotFound { label: String },

    /// 存档点未找到
    #[error("存档点 '{mark}' 未找到")]
    SaveMarkNotFound { mark: String },

    /// 控制流不匹配（endif 无 if 等）
    #[error("控制流不匹配: {message}")]
    Unbalanced { message: String },

    /// 单帧内执行的指令数超过上限
    #[error("单帧内连续执行的指令数超过上限 {limit}")]
    RunawayChain { limit: usize },
}

/// 宏定义缺陷种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroDefectKind {
    /// 缺少 endmacro
    Unterminated,
    /// 宏体为空
    Empty,
    /// 宏体内包含标签
    ContainsLabel,
    /// 宏体内包含存档点
    ContainsSaveMark,
    /// 宏体内嵌套了宏定义
    Nested,
}

impl std::fmt::Display for MacroDefectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unterminated => write!(f, "缺少 endmacro"),
            Self::Empty => write!(f, "宏体为空"),
            Self::ContainsLabel => write!(f, "宏体内不能包含标签"),
            Self::ContainsSaveMark => write!(f, "宏体内不能包含存档点"),
            Self::Nested => write!(f, "宏体内不能嵌套宏定义"),
        }
    }
}

/// 资源加载错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResourceError {
    /// 脚本文件加载失败
    #[error("无法加载脚本 '{path}': {message}")]
    Script { path: String, message: String },

    /// 图片加载失败
    #[error("无法加载图片 '{path}': {message}")]
    Image { path: String, message: String },

    /// 视频加载失败
    #[error("无法加载视频 '{path}': {message}")]
    Video { path: String, message: String },

    /// 目标图层不存在
    #[error("图层 {layer} 不存在")]
    LayerNotFound { layer: usize },

    /// 音频缓冲区不存在
    #[error("音频缓冲区 {index} 不存在")]
    SoundBufferNotFound { index: usize },
}

/// 存档错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SaveError {
    /// 序列化失败
    #[error("序列化失败: {0}")]
    SerializationFailed(String),

    /// 反序列化失败
    #[error("反序列化失败: {0}")]
    DeserializationFailed(String),

    /// 版本不兼容
    #[error("存档版本不兼容: 存档版本 {save_version} vs 当前版本 {current_version}")]
    IncompatibleVersion {
        save_version: String,
        current_version: String,
    },

    /// 存储读写失败
    #[error("存储操作失败: {0}")]
    Storage(String),

    /// 存档不存在
    #[error("存档不存在: {0}")]
    NotFound(String),
}

/// vn-conductor 统一错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VnError {
    /// 解析错误
    #[error("解析错误: {0}")]
    Parse(#[from] ParseError),

    /// 表达式错误
    #[error("表达式错误: {0}")]
    Expr(#[from] ExprError),

    /// 指令错误
    #[error("指令错误: {0}")]
    Tag(#[from] TagError),

    /// 资源错误
    #[error("资源错误: {0}")]
    Resource(#[from] ResourceError),

    /// 存档错误
    #[error("存档错误: {0}")]
    Save(#[from] SaveError),

    /// 配置不合法
    #[error("配置错误: {0}")]
    Config(String),

    /// 执行某条指令时发生的错误（带脚本路径与行号）
    #[error("{file}:{line} [{tag}] {source}")]
    InScript {
        file: String,
        line: usize,
        tag: String,
        source: Box<VnError>,
    },
}

impl VnError {
    /// 附加脚本位置信息
    ///
    /// 已经带位置的错误不会重复包装。
    pub fn in_script(self, file: &str, line: usize, tag: &str) -> Self {
        match self {
            located @ VnError::InScript { .. } => located,
            other => VnError::InScript {
                file: file.to_string(),
                line,
                tag: tag.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// 去掉位置包装，返回根错误
    pub fn root(&self) -> &VnError {
        match self {
            VnError::InScript { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result 类型别名
pub type VnResult<T> = Result<T, VnError>;
