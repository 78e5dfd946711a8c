//! Flattening Pronote objects into attribute dictionaries
//!
//! Dates and datetimes render as ISO-8601 strings through their serde
//! representation.

use pronote_api::{
    Absence, Attachment, Average, Delay, Evaluation, Food, Grade, Homework, Information, Lesson,
    Menu, Punishment,
};
use serde_json::{json, Value};

use crate::consts::HOMEWORK_DESC_MAX_LENGTH;

/// Name shown for a lesson
pub fn format_displayed_lesson(lesson: &Lesson) -> String {
    if lesson.detention {
        return "RETENUE".to_string();
    }
    match &lesson.subject {
        Some(subject) => subject.name.clone(),
        None => "autre".to_string(),
    }
}

pub fn format_lesson(lesson: &Lesson) -> Value {
    json!({
        "start_at": lesson.start,
        "end_at": lesson.end,
        "start_time": lesson.start.format("%H:%M").to_string(),
        "end_time": lesson.end.format("%H:%M").to_string(),
        "lesson": format_displayed_lesson(lesson),
        "classroom": lesson.classroom,
        "canceled": lesson.canceled,
        "status": lesson.status,
        "background_color": lesson.background_color,
        "teacher_name": lesson.teacher_name,
        "teacher_names": lesson.teacher_names,
        "classrooms": lesson.classrooms,
        "outing": lesson.outing,
        "memo": lesson.memo,
        "group_name": lesson.group_name,
        "group_names": lesson.group_names,
        "exempted": lesson.exempted,
        "virtual_classrooms": lesson.virtual_classrooms,
        "num": lesson.num,
        "detention": lesson.detention,
        "test": lesson.test,
    })
}

pub fn format_attachment_list(attachments: &[Attachment]) -> Value {
    attachments
        .iter()
        .map(|a| json!({"name": a.name, "url": a.url, "type": a.kind}))
        .collect()
}

pub fn format_homework(homework: &Homework) -> Value {
    let short_description: String = homework
        .description
        .chars()
        .take(HOMEWORK_DESC_MAX_LENGTH)
        .collect();
    json!({
        "date": homework.date,
        "subject": homework.subject.name,
        "short_description": short_description,
        "description": homework.description,
        "done": homework.done,
        "background_color": homework.background_color,
        "files": format_attachment_list(&homework.files),
    })
}

/// French decimal separator
fn comma(value: &str) -> String {
    value.replace('.', ",")
}

pub fn format_grade(grade: &Grade) -> Value {
    json!({
        "date": grade.date,
        "subject": grade.subject.name,
        "comment": grade.comment,
        "grade": grade.grade,
        "out_of": comma(&grade.out_of),
        "default_out_of": comma(&grade.default_out_of),
        "grade_out_of": format!("{}/{}", grade.grade, grade.out_of),
        "coefficient": comma(&grade.coefficient),
        "class_average": comma(&grade.average),
        "max": comma(&grade.max),
        "min": comma(&grade.min),
        "is_bonus": grade.is_bonus,
        "is_optionnal": grade.is_optionnal,
        "is_out_of_20": grade.is_out_of_20,
    })
}

pub fn format_absence(absence: &Absence) -> Value {
    json!({
        "from": absence.from_date,
        "to": absence.to_date,
        "justified": absence.justified,
        "hours": absence.hours,
        "days": absence.days,
        "reason": absence.reasons.join(", "),
    })
}

pub fn format_delay(delay: &Delay) -> Value {
    json!({
        "date": delay.date,
        "minutes": delay.minutes,
        "justified": delay.justified,
        "justification": delay.justification,
        "reasons": delay.reasons.join(", "),
    })
}

pub fn format_evaluation(evaluation: &Evaluation) -> Value {
    let acquisitions: Vec<Value> = evaluation
        .acquisitions
        .iter()
        .map(|a| {
            json!({
                "order": a.order,
                "name_id": a.name_id,
                "name": a.name,
                "abbreviation": a.abbreviation,
                "level": a.level,
                "domain_id": a.domain_id,
                "domain": a.domain,
                "coefficient": a.coefficient,
                "pillar_id": a.pillar_id,
                "pillar": a.pillar,
                "pillar_prefix": a.pillar_prefix,
            })
        })
        .collect();

    json!({
        "name": evaluation.name,
        "domain": evaluation.domain,
        "date": evaluation.date,
        "subject": evaluation.subject.name,
        "description": evaluation.description,
        "coefficient": evaluation.coefficient,
        "paliers": evaluation.paliers,
        "teacher": evaluation.teacher,
        "acquisitions": acquisitions,
    })
}

pub fn format_average(average: &Average) -> Value {
    json!({
        "average": average.student,
        "class": average.class_average,
        "max": average.max,
        "min": average.min,
        "out_of": average.out_of,
        "default_out_of": average.default_out_of,
        "subject": average.subject.name,
        "background_color": average.background_color,
    })
}

/// `H:MM:SS`
fn format_minutes(minutes: u32) -> String {
    format!("{}:{:02}:00", minutes / 60, minutes % 60)
}

pub fn format_punishment(punishment: &Punishment) -> Value {
    let schedule: Vec<Value> = punishment
        .schedule
        .iter()
        .map(|s| json!({"start": s.start, "duration": s.duration.map(format_minutes)}))
        .collect();

    json!({
        "date": punishment.given.format("%Y-%m-%d").to_string(),
        "subject": punishment.during_lesson,
        "reasons": punishment.reasons,
        "circumstances": punishment.circumstances,
        "nature": punishment.nature,
        "duration": punishment.duration.map(format_minutes),
        "homework": punishment.homework,
        "exclusion": punishment.exclusion,
        "during_lesson": punishment.during_lesson,
        "homework_documents": format_attachment_list(&punishment.homework_documents),
        "circumstance_documents": format_attachment_list(&punishment.circumstance_documents),
        "giver": punishment.giver,
        "schedule": schedule,
        "schedulable": punishment.schedulable,
    })
}

/// A missing course renders as an empty list
pub fn format_food_list(food_list: Option<&[Food]>) -> Value {
    food_list
        .unwrap_or_default()
        .iter()
        .map(|food| {
            let labels: Vec<Value> = food
                .labels
                .iter()
                .map(|l| json!({"name": l.name, "color": l.color}))
                .collect();
            json!({"name": food.name, "labels": labels})
        })
        .collect()
}

pub fn format_menu(menu: &Menu) -> Value {
    json!({
        "name": menu.name,
        "date": menu.date.format("%Y-%m-%d").to_string(),
        "is_lunch": menu.is_lunch,
        "is_dinner": menu.is_dinner,
        "first_meal": format_food_list(menu.first_meal.as_deref()),
        "main_meal": format_food_list(menu.main_meal.as_deref()),
        "side_meal": format_food_list(menu.side_meal.as_deref()),
        "other_meal": format_food_list(menu.other_meal.as_deref()),
        "cheese": format_food_list(menu.cheese.as_deref()),
        "dessert": format_food_list(menu.dessert.as_deref()),
    })
}

pub fn format_information_and_survey(information: &Information) -> Value {
    json!({
        "author": information.author,
        "title": information.title,
        "read": information.read,
        "creation_date": information.creation_date,
        "start_date": information.start_date,
        "end_date": information.end_date,
        "category": information.category,
        "survey": information.survey,
        "anonymous_response": information.anonymous_response,
        "attachments": format_attachment_list(&information.attachments),
        "template": information.template,
        "shared_template": information.shared_template,
        "content": information.content,
    })
}
