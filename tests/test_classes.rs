use lunabind::{Class, ClassBuilder, Config, Context, ErrorHandlers};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

type Reported = Rc<RefCell<Vec<String>>>;

fn context() -> (Context, Reported) {
    let reported: Reported = Rc::new(RefCell::new(Vec::new()));
    let sink = reported.clone();
    let handlers =
        ErrorHandlers::new().on_error(move |message| sink.borrow_mut().push(message.to_string()));
    (Context::with_config(Config::default(), handlers), reported)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Vec3 {
    x: f64,
    y: f64,
    z: f64,
}

impl Vec3 {
    fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

impl Class for Vec3 {}

fn vec3_class() -> ClassBuilder<Vec3> {
    ClassBuilder::<Vec3>::new("vec3")
        .constructor(|x: f64, y: f64, z: f64| Vec3 { x, y, z })
        .property("x", |v: &mut Vec3, x: f64| v.x = x, |v: &Vec3| v.x)
        .property("y", |v: &mut Vec3, y: f64| v.y = y, |v: &Vec3| v.y)
        .property("z", |v: &mut Vec3, z: f64| v.z = z, |v: &Vec3| v.z)
        .method("length", |v: &Vec3| v.length())
        .method("add", |a: &Vec3, b: Vec3| Vec3 {
            x: a.x + b.x,
            y: a.y + b.y,
            z: a.z + b.z,
        })
        .method("scale", |v: &mut Vec3, k: f64| {
            v.x *= k;
            v.y *= k;
            v.z *= k;
        })
        .function("dot", |a: Vec3, b: Vec3| a.x * b.x + a.y * b.y + a.z * b.z)
}

#[test]
fn test_vec3_end_to_end() {
    let (ctx, reported) = context();
    assert!(ctx.register_class(vec3_class()));

    let length: f64 = ctx.eval("local a = vec3(3, 4, 0); return a:length()").unwrap();
    assert_eq!(length, 5.0);
    assert!(reported.borrow().is_empty());
}

#[test]
fn test_property_roundtrip() {
    let (ctx, _) = context();
    assert!(ctx.register_class(vec3_class()));

    let x: f64 = ctx.eval("local a = vec3(0, 0, 0); a.x = 100; return a.x").unwrap();
    assert_eq!(x, 100.0);

    #[derive(Clone)]
    struct Account {
        id: i64,
    }
    impl Class for Account {}

    assert!(ctx.register_class(
        ClassBuilder::<Account>::new("account")
            .constructor(|| Account { id: 0 })
            .property("id", |a: &mut Account, id: i64| a.id = id, |a: &Account| a.id),
    ));
    let id: i64 = ctx.eval("local a = account(); a.id = 100; return a.id").unwrap();
    assert_eq!(id, 100);
}

#[test]
fn test_registration_is_idempotent() {
    let (ctx, reported) = context();
    assert!(ctx.register_class(vec3_class()));
    let before = ctx.class_info::<Vec3>().unwrap();

    let replacement = ClassBuilder::<Vec3>::new("other_vec3").method("length", |_: &Vec3| 0.0);
    assert!(!ctx.register_class(replacement));
    assert_eq!(ctx.class_info::<Vec3>().unwrap(), before);
    assert_eq!(reported.borrow().len(), 1);
    assert!(reported.borrow()[0].contains("already registered"));

    // The first registration still drives dispatch
    let length: f64 = ctx.eval("return vec3(0, 3, 4):length()").unwrap();
    assert_eq!(length, 5.0);
    assert_eq!(ctx.eval::<Option<i64>>("return other_vec3").unwrap(), None);
}

#[test]
fn test_create_and_static_functions() {
    let (ctx, _) = context();
    assert!(ctx.register_class(vec3_class()));

    let (a, b): (f64, f64) = ctx
        .eval("local a = vec3.create(1, 2, 3); local b = vec3(1, 2, 3); return a.z, b.z")
        .unwrap();
    assert_eq!((a, b), (3.0, 3.0));

    let dot: f64 = ctx
        .eval("return vec3.dot(vec3(1, 2, 3), vec3(4, 5, 6))")
        .unwrap();
    assert_eq!(dot, 32.0);
}

#[test]
fn test_class_without_constructor() {
    #[derive(Clone)]
    struct Token;
    impl Class for Token {}

    let (ctx, reported) = context();
    assert!(ctx.register_class(ClassBuilder::<Token>::new("token").function("kind", || "token")));

    assert_eq!(ctx.eval::<String>("return token.kind()").unwrap(), "token");
    assert!(ctx.execute("token()").is_err());
    assert!(ctx.eval::<Option<i64>>("return token.create").unwrap().is_none());
    assert_eq!(reported.borrow().len(), 1);
}

#[test]
fn test_values_cross_by_value() {
    let (ctx, _) = context();
    assert!(ctx.register_class(vec3_class()));
    ctx.add_function("origin", || Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    });

    let sum: Vec3 = ctx
        .eval("local a = vec3(1, 2, 3); return a:add(vec3(1, 1, 1))")
        .unwrap();
    assert_eq!(
        sum,
        Vec3 {
            x: 2.0,
            y: 3.0,
            z: 4.0
        }
    );

    // Mutating a copy leaves the original alone
    let (moved, origin): (f64, f64) = ctx
        .eval("local o = origin(); local c = o:add(vec3(1, 0, 0)); c.x = 9; return c.x, o.x")
        .unwrap();
    assert_eq!((moved, origin), (9.0, 0.0));

    ctx.add_global(
        "native",
        Vec3 {
            x: 1.0,
            y: 1.0,
            z: 1.0,
        },
    );
    ctx.execute("native:scale(2)").unwrap();
    let native: Vec3 = ctx.get_global("native").unwrap();
    assert_eq!(native.y, 2.0);
}

#[test]
fn test_instance_lifecycle() {
    struct Tracked {
        drops: Rc<Cell<usize>>,
    }
    impl Drop for Tracked {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }
    impl Class for Tracked {}

    let drops = Rc::new(Cell::new(0));
    let (ctx, _) = context();
    let counter = drops.clone();
    assert!(ctx.register_class(ClassBuilder::<Tracked>::new("tracked").constructor(move || Tracked {
        drops: counter.clone(),
    })));

    ctx.execute("for i = 1, 10 do tracked() end").unwrap();
    ctx.collect_garbage();
    assert_eq!(drops.get(), 10);

    ctx.execute("keep = tracked()").unwrap();
    ctx.collect_garbage();
    assert_eq!(drops.get(), 10);

    // Closing finalizes what is still reachable, and nothing twice
    drop(ctx);
    assert_eq!(drops.get(), 11);
}

#[test]
fn test_borrowed_pointer_is_not_dropped() {
    let (ctx, _) = context();
    assert!(ctx.register_class(vec3_class()));

    let raw = Box::into_raw(Box::new(Vec3 {
        x: 1.0,
        y: 2.0,
        z: 3.0,
    }));
    ctx.add_global("shared", raw);
    ctx.execute("shared.x = 7").unwrap();
    assert_eq!(ctx.eval::<f64>("return shared:length()").unwrap(), (49.0f64 + 4.0 + 9.0).sqrt());
    drop(ctx);

    let value = unsafe { Box::from_raw(raw) };
    assert_eq!(value.x, 7.0);
}

#[test]
fn test_pointer_argument_reaches_owned_instance() {
    let (ctx, _) = context();
    assert!(ctx.register_class(vec3_class()));
    ctx.add_function("zero_x", |v: *mut Vec3| {
        if let Some(v) = unsafe { v.as_mut() } {
            v.x = 0.0;
        }
    });

    let x: f64 = ctx.eval("local a = vec3(5, 5, 5); zero_x(a); return a.x").unwrap();
    assert_eq!(x, 0.0);
}

#[test]
fn test_wrong_argument_class() {
    let (ctx, reported) = context();
    assert!(ctx.register_class(vec3_class()));

    let result: Option<f64> = ctx.eval("return vec3.dot(vec3(1, 0, 0), 5)").unwrap();
    assert_eq!(result, None);
    assert_eq!(reported.borrow().len(), 1);
    assert!(reported.borrow()[0].contains("Expected 'vec3' value, got 'number'"));
    assert!(reported.borrow()[0].contains("[Fn: dot"), "{}", reported.borrow()[0]);
}

#[test]
fn test_class_info_shape() {
    let ctx = Context::new(false);
    assert!(ctx.register_class(vec3_class()));

    let info = ctx.class_info::<Vec3>().unwrap();
    assert_eq!(info.name, "vec3");
    let names: Vec<&str> = info.properties.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["x", "y", "z"]);
    assert!(info.properties.iter().all(|p| p.readable && p.writable));
    assert_eq!(info.methods, vec!["add", "length", "scale"]);
    assert_eq!(info.functions, vec!["dot"]);
}

#[test]
fn test_wide_constructor_and_method() {
    #[derive(Clone)]
    struct Box3 {
        min: [f64; 3],
        max: [f64; 3],
        label: String,
        solid: bool,
    }
    impl Class for Box3 {}

    let (ctx, reported) = context();
    assert!(ctx.register_class(
        ClassBuilder::<Box3>::new("box3")
            .constructor(
                |ax: f64, ay: f64, az: f64, bx: f64, by: f64, bz: f64, label: String, solid: bool| {
                    Box3 {
                        min: [ax, ay, az],
                        max: [bx, by, bz],
                        label,
                        solid,
                    }
                },
            )
            .method(
                "reshape",
                |b: &mut Box3, ax: f64, ay: f64, az: f64, bx: f64, by: f64, bz: f64| {
                    b.min = [ax, ay, az];
                    b.max = [bx, by, bz];
                },
            )
            .method("volume", |b: &Box3| {
                (0..3).map(|i| b.max[i] - b.min[i]).product::<f64>()
            })
            .getter("label", |b: &Box3| b.label.clone())
            .getter("solid", |b: &Box3| b.solid),
    ));

    let (volume, label, solid): (f64, String, bool) = ctx
        .eval(
            "local b = box3(0, 0, 0, 1, 2, 3, 'crate', true)
             return b:volume(), b.label, b.solid",
        )
        .unwrap();
    assert_eq!((volume, label.as_str(), solid), (6.0, "crate", true));

    let reshaped: f64 = ctx
        .eval(
            "local b = box3(0, 0, 0, 1, 1, 1, 'x', false)
             b:reshape(1, 1, 1, 3, 3, 3)
             return b:volume()",
        )
        .unwrap();
    assert_eq!(reshaped, 8.0);
    assert!(reported.borrow().is_empty());
}
