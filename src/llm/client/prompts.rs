//! Default prompt templates.

/// Topic matching. Placeholders: `{topic_list}`, `{content}`.
pub const DEFAULT_TOPIC_PROMPT: &str = r#"你是社交媒体数据分析专家，需要分析帖子主题：
1. 从列表中选择与帖子内容最匹配的主题词：{topic_list}
2. 若均不匹配，返回"不相关"
3. 仅返回结果，不添加任何解释、标点或多余文字
帖子内容：{content}
"#;

/// Sentiment annotation. Placeholders: `{topic}`, `{comment}`.
pub const DEFAULT_SENTIMENT_PROMPT: &str = r#"你是一个社交媒体数据分析专家，正在分析TikTok被禁期间外国网友涌入小红书平台的用户评论。请根据以下要求分析评论：
分析维度：
1. sentiment：[快乐, 悲伤, 厌恶, 恐惧, 愤怒, 惊讶, 赞美, 感动, 疑惑, 对比]
   若不属于以上任何一类，标记为"中性"
2. user_origin（根据语义判断）：只能是[中国用户, 外国用户, 未知]中的一个
   - 中国用户：使用本土化表达、熟悉小红书文化、以主人姿态发言
   - 外国用户：表达不熟悉、跨文化视角、游客心态
3. 情感维度评分（0-5整数）：
   - valence：情感积极程度（0=非常负面，5=非常积极）
   - arousal：情感强烈程度（0=平静，5=兴奋）
   - dominance：控制感程度（0=无助，5=掌控）
当前分析对象：
笔记topic: {topic}
评论内容: {comment}

输出示例："sentiment":"感动","user_origin":"外国用户","valence":4,"arousal":3,"dominance":2
"#;
